use anyhow::{Result, anyhow};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use super::Stores;
use super::threads::{format_thread_list, resolve_thread};
use crate::chat::{ChatError, DEFAULT_THREAD_TITLE, Messenger, Thread};
use crate::completion::CompletionClient;
use crate::core::AppConfig;
use crate::settings::mask_token;

const HELP: &str = "\
Commands:
  /new [title]     start a new thread
  /threads         list threads
  /switch N|ID     open another thread
  /rename TITLE    rename the current thread
  /remove [N|ID]   remove a thread (the current one by default)
  /delete MSG_ID   remove a message from the current thread
  /export          print the current thread
  /reset           replace all threads with a single empty one
  /token VALUE     set the API token
  /dev on|off      toggle developer mode
  /help            show this help
  /quit            leave
Anything else is sent as a message.";

#[derive(Debug, PartialEq)]
pub enum Input {
    Message(String),
    New(Option<String>),
    Threads,
    Switch(String),
    Rename(String),
    Remove(Option<String>),
    Delete(String),
    Export,
    Reset,
    Token(String),
    Dev(bool),
    Help,
    Quit,
    Invalid(String),
    Empty,
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line.to_string());
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    let arg = (!arg.is_empty()).then(|| arg.to_string());

    match (name, arg) {
        ("new", title) => Input::New(title),
        ("threads", None) => Input::Threads,
        ("switch", Some(reference)) => Input::Switch(reference),
        ("rename", Some(title)) => Input::Rename(title),
        ("remove", reference) => Input::Remove(reference),
        ("delete", Some(message_id)) => Input::Delete(message_id),
        ("export", None) => Input::Export,
        ("reset", None) => Input::Reset,
        ("token", Some(token)) => Input::Token(token),
        ("dev", Some(state)) if state == "on" => Input::Dev(true),
        ("dev", Some(state)) if state == "off" => Input::Dev(false),
        ("help", None) => Input::Help,
        ("quit", None) | ("exit", None) => Input::Quit,
        _ => Input::Invalid(line.to_string()),
    }
}

/// The thread to show after `removed` was deleted. When the current
/// thread goes away the last remaining one is picked; `None` means
/// there is nothing left and a new thread is needed.
pub fn selection_after_removal(
    remaining: &[Thread],
    current: &str,
    removed: &str,
) -> Option<String> {
    if current != removed {
        return Some(current.to_string());
    }
    remaining.last().map(|t| t.id.clone())
}

struct Session<'a> {
    messenger: Messenger,
    stores: &'a Stores,
    current: String,
}

impl Session<'_> {
    fn current_thread(&self) -> Option<Thread> {
        self.messenger.content().thread(&self.current)
    }

    fn switch_to(&mut self, thread_id: String) {
        self.current = thread_id;
        if let Some(thread) = self.current_thread() {
            println!("== {} ==", thread.title);
            print!("{}", thread.transcript());
        }
    }

    fn new_thread(&mut self, title: Option<&str>) {
        let thread = self
            .messenger
            .new_thread(title.unwrap_or(DEFAULT_THREAD_TITLE));
        self.switch_to(thread.id);
    }

    async fn send(&mut self, text: &str) {
        let outcome = match self.messenger.send(&self.current, text).await {
            Ok(outcome) => outcome,
            Err(ChatError::Rejected(body)) => {
                println!("Error: {}", body);
                return;
            }
            Err(e) => {
                println!("Error: {}", e);
                return;
            }
        };

        match &outcome.reply {
            Some(reply) => println!("{}:\n{}\n", reply.display_name(), reply.text),
            None => println!("(empty answer)"),
        }
        if self.stores.settings.dev_mode() {
            println!(
                "[used_words_count: {:?}, used_tokens_count: {:?}]",
                outcome.usage.words, outcome.usage.tokens
            );
        }
        // Waiting here keeps the prompt from interleaving with the
        // title update
        if let Some(naming) = outcome.naming {
            if let Some(title) = naming.wait().await {
                println!("== {} ==", title);
            }
        }
    }

    fn remove(&mut self, reference: Option<&str>) {
        let threads = self.messenger.content().threads();
        let target = match reference {
            Some(reference) => resolve_thread(&threads, reference),
            None => Some(self.current.clone()),
        };
        let Some(target) = target else {
            println!("No such thread");
            return;
        };

        if let Some(removed) = self.messenger.remove_thread(&target) {
            println!("Removed {}", removed.title);
        }
        let remaining = self.messenger.content().threads();
        match selection_after_removal(&remaining, &self.current, &target) {
            Some(id) if id == self.current => {}
            Some(id) => self.switch_to(id),
            None => self.new_thread(None),
        }
    }

    /// Returns false when the session should end.
    async fn handle(&mut self, input: Input) -> bool {
        match input {
            Input::Empty => {}
            Input::Message(text) => self.send(&text).await,
            Input::New(title) => self.new_thread(title.as_deref()),
            Input::Threads => {
                let threads = self.messenger.content().threads();
                print!("{}", format_thread_list(&threads, Some(self.current.as_str())));
            }
            Input::Switch(reference) => {
                let threads = self.messenger.content().threads();
                match resolve_thread(&threads, &reference) {
                    Some(id) => self.switch_to(id),
                    None => println!("No such thread"),
                }
            }
            Input::Rename(title) => {
                if let Err(e) = self.messenger.content().rename_thread(&self.current, &title) {
                    println!("Error: {}", e);
                }
            }
            Input::Remove(reference) => self.remove(reference.as_deref()),
            Input::Delete(message_id) => {
                if !self
                    .messenger
                    .content()
                    .remove_message(&message_id, &self.current)
                {
                    println!("No such message");
                }
            }
            Input::Export => {
                if let Some(thread) = self.current_thread() {
                    print!("{}", thread.transcript());
                }
            }
            Input::Reset => {
                self.messenger.reset_state();
                let first = self.messenger.content().threads()[0].id.clone();
                self.switch_to(first);
            }
            Input::Token(token) => {
                self.stores.settings.set_token(&token);
                println!("Token saved ({})", mask_token(&token));
            }
            Input::Dev(enabled) => {
                self.stores.settings.set_dev_mode(enabled);
                println!("Developer mode {}", if enabled { "on" } else { "off" });
            }
            Input::Help => println!("{}", HELP),
            Input::Quit => return false,
            Input::Invalid(line) => println!("Unknown command: {} (try /help)", line),
        }
        true
    }
}

pub async fn run(config: &AppConfig, stores: &Stores, thread: Option<String>) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    let messenger = Messenger::new(
        stores.content.clone(),
        stores.settings.clone(),
        CompletionClient::new(&config.completion_url),
        &config.assistant_name,
    );

    let threads = stores.content.threads();
    let current = match thread {
        Some(reference) => resolve_thread(&threads, &reference)
            .ok_or_else(|| anyhow!("No thread matches {}", reference))?,
        None => match threads.last() {
            Some(t) => t.id.clone(),
            None => stores.content.add_thread(DEFAULT_THREAD_TITLE).id,
        },
    };

    if stores.settings.token().is_empty() {
        println!("No API token set, use /token VALUE");
    }

    let mut session = Session {
        messenger,
        stores,
        current: String::new(),
    };
    session.switch_to(current);

    loop {
        let readline = rl.readline(">>> ");
        match readline {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                if !session.handle(parse_input(&line)).await {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_parses_messages_and_commands() {
        assert_eq!(parse_input("  hello there "), Input::Message(String::from("hello there")));
        assert_eq!(parse_input(""), Input::Empty);
        assert_eq!(parse_input("/new"), Input::New(None));
        assert_eq!(
            parse_input("/new Trip plans"),
            Input::New(Some(String::from("Trip plans")))
        );
        assert_eq!(parse_input("/switch 2"), Input::Switch(String::from("2")));
        assert_eq!(parse_input("/remove"), Input::Remove(None));
        assert_eq!(parse_input("/dev on"), Input::Dev(true));
        assert_eq!(parse_input("/dev off"), Input::Dev(false));
        assert_eq!(parse_input("/exit"), Input::Quit);
    }

    #[test]
    fn it_rejects_malformed_commands() {
        assert_eq!(parse_input("/switch"), Input::Invalid(String::from("/switch")));
        assert_eq!(parse_input("/dev maybe"), Input::Invalid(String::from("/dev maybe")));
        assert_eq!(parse_input("/bogus"), Input::Invalid(String::from("/bogus")));
    }

    #[test]
    fn it_picks_a_thread_after_removal() {
        let remaining = vec![Thread::with_id("a", "A"), Thread::with_id("b", "B")];

        // Removing another thread keeps the current one
        assert_eq!(
            selection_after_removal(&remaining, "a", "x"),
            Some(String::from("a"))
        );
        // Removing the current thread falls back to the last one left
        assert_eq!(
            selection_after_removal(&remaining, "x", "x"),
            Some(String::from("b"))
        );
        // Nothing left means a new thread is needed
        assert_eq!(selection_after_removal(&[], "x", "x"), None);
    }
}
