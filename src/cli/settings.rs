use crate::settings::{SettingsStore, mask_token};

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn enabled(self) -> bool {
        self == Toggle::On
    }
}

pub fn token(settings: &SettingsStore, value: Option<&str>) {
    match value {
        Some(value) => {
            settings.set_token(value);
            println!("Token saved");
        }
        None => {
            let token = settings.token();
            if token.is_empty() {
                println!("No token set");
            } else {
                println!("{}", mask_token(&token));
            }
        }
    }
}

pub fn dev_mode(settings: &SettingsStore, state: Toggle) {
    settings.set_dev_mode(state.enabled());
    println!(
        "Developer mode {}",
        if state.enabled() { "on" } else { "off" }
    );
}
