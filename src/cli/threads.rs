use anyhow::{Result, anyhow};

use crate::chat::{ContentStore, Thread};

/// One line per thread, numbered from 1 so threads can be picked by
/// position.
pub fn format_thread_list(threads: &[Thread], current: Option<&str>) -> String {
    threads
        .iter()
        .enumerate()
        .map(|(idx, t)| {
            let marker = if Some(t.id.as_str()) == current { "*" } else { " " };
            format!(
                "{} {:>2}. {} ({} messages) [{}]\n",
                marker,
                idx + 1,
                t.title,
                t.messages.len(),
                t.id
            )
        })
        .collect()
}

/// Finds a thread by id or, failing that, by its 1-based position.
pub fn resolve_thread(threads: &[Thread], reference: &str) -> Option<String> {
    if let Some(thread) = threads.iter().find(|t| t.id == reference) {
        return Some(thread.id.clone());
    }
    let position = reference.parse::<usize>().ok()?;
    position
        .checked_sub(1)
        .and_then(|idx| threads.get(idx))
        .map(|t| t.id.clone())
}

pub fn list(content: &ContentStore) {
    print!("{}", format_thread_list(&content.threads(), None));
}

pub fn export(content: &ContentStore, reference: &str) -> Result<()> {
    let threads = content.threads();
    let thread = resolve_thread(&threads, reference)
        .and_then(|id| threads.iter().find(|t| t.id == id))
        .ok_or_else(|| anyhow!("No thread matches {}", reference))?;
    print!("{}", thread.transcript());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn threads() -> Vec<Thread> {
        vec![
            Thread::with_id("1", "First"),
            Thread::with_id("abc", "Second"),
        ]
    }

    #[test]
    fn it_resolves_by_position_or_id() {
        let threads = threads();
        assert_eq!(resolve_thread(&threads, "2"), Some(String::from("abc")));
        assert_eq!(resolve_thread(&threads, "abc"), Some(String::from("abc")));
        assert_eq!(resolve_thread(&threads, "1"), Some(String::from("1")));
        assert_eq!(resolve_thread(&threads, "0"), None);
        assert_eq!(resolve_thread(&threads, "missing"), None);
    }

    #[test]
    fn it_prefers_ids_over_positions() {
        let threads = vec![
            Thread::with_id("abc", "First"),
            Thread::with_id("1", "Second"),
        ];
        assert_eq!(resolve_thread(&threads, "1"), Some(String::from("1")));
        assert_eq!(resolve_thread(&threads, "2"), Some(String::from("1")));
    }

    #[test]
    fn it_marks_the_current_thread() {
        let listing = format_thread_list(&threads(), Some("abc"));
        assert_eq!(
            listing,
            "   1. First (0 messages) [1]\n*  2. Second (0 messages) [abc]\n"
        );
    }
}
