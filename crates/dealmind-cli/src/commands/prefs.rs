use anyhow::Result;
use serde_json::{Value, json};

use super::parse_pair;
use crate::cli::PrefsCommands;
use crate::output::{OutputFormat, json::print_json};
use crate::setup::Runtime;

pub fn run(runtime: &Runtime, command: PrefsCommands, format: OutputFormat) -> Result<()> {
    let manager = &runtime.manager;
    match command {
        PrefsCommands::Get { user } => {
            let prefs = manager.get_preferences(&user);
            if format.is_json() {
                return print_json(&prefs);
            }
            if prefs.is_empty() {
                println!("No preferences for {user}");
            }
            for (key, value) in prefs.iter() {
                println!("{key} = {}", render_value(value));
            }
            Ok(())
        }
        PrefsCommands::Set { user, pairs } => {
            let mut prefs = manager.get_preferences(&user);
            for pair in &pairs {
                let (key, value) = parse_pair(pair)?;
                prefs.set(key, value);
            }
            manager.set_preferences(&user, &prefs)?;
            if format.is_json() {
                return print_json(&json!({ "user": user, "preferences": prefs }));
            }
            println!("Updated {} preference(s) for {user}", pairs.len());
            Ok(())
        }
        PrefsCommands::Unset { user, key } => {
            let mut prefs = manager.get_preferences(&user);
            let removed = prefs.remove(&key).is_some();
            if removed {
                manager.set_preferences(&user, &prefs)?;
            }
            if format.is_json() {
                return print_json(&json!({ "user": user, "key": key, "removed": removed }));
            }
            if removed {
                println!("Removed {key} for {user}");
            } else {
                println!("{key} was not set for {user}");
            }
            Ok(())
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
