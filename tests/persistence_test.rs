//! Integration tests for persisting stores through SQLite

mod test_utils;

#[cfg(test)]
mod tests {
    use threadchat::chat::{ContentStore, MessageDraft, SEED_THREAD_ID, seed_threads};
    use threadchat::cli::Stores;
    use threadchat::settings::{Settings, SettingsStore};

    use crate::test_utils::{open_storage, test_storage};

    #[tokio::test]
    async fn it_seeds_an_empty_database() {
        let (storage, _dir) = test_storage().await;
        let content = ContentStore::load(&storage).await.unwrap();
        assert_eq!(content.threads().as_slice(), seed_threads().as_slice());
    }

    #[tokio::test]
    async fn it_restores_threads_after_restart() {
        let (storage, dir) = test_storage().await;
        let content = ContentStore::load(&storage).await.unwrap();

        let thread = content.add_thread("Groceries");
        let msg = content
            .add_message(MessageDraft::user("milk"), &thread.id)
            .unwrap();
        content.rename_thread(&thread.id, "Shopping").unwrap();
        content.remove_message("missing", &thread.id);
        content.flush().await;

        let reopened = open_storage(&dir).await;
        let restored = ContentStore::load(&reopened).await.unwrap();

        assert_eq!(restored.threads(), content.threads());
        let restored_thread = restored.thread(&thread.id).unwrap();
        assert_eq!(restored_thread.title, "Shopping");
        assert_eq!(restored_thread.messages, vec![msg]);
    }

    #[tokio::test]
    async fn it_persists_a_reset() {
        let (storage, dir) = test_storage().await;
        let content = ContentStore::load(&storage).await.unwrap();
        content.add_thread("Temporary");
        content
            .add_message(MessageDraft::user("hi"), SEED_THREAD_ID)
            .unwrap();
        content.reset_state();
        content.flush().await;

        let restored = ContentStore::load(&open_storage(&dir).await).await.unwrap();
        assert_eq!(restored.threads().as_slice(), seed_threads().as_slice());
    }

    #[tokio::test]
    async fn it_keeps_settings_and_content_apart() {
        let (storage, dir) = test_storage().await;
        let stores = Stores::load(&storage).await.unwrap();

        stores.settings.set_token("sk-test");
        stores.settings.set_dev_mode(true);
        stores.content.add_thread("Second");
        stores.flush().await;

        let reopened = open_storage(&dir).await;
        let settings = SettingsStore::load(&reopened).await.unwrap();
        assert_eq!(
            settings.settings(),
            Settings {
                token: String::from("sk-test"),
                dev_mode: true
            }
        );

        let content = ContentStore::load(&reopened).await.unwrap();
        assert_eq!(content.threads().len(), 2);
    }
}
