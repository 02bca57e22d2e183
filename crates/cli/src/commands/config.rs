//! Config command - view or modify configuration.

use anyhow::Result;
use ridechat_core::chat::Identity;
use ridechat_core::Config;

/// The identity slot a `customer_*` or `driver_*` key refers to.
fn identity_slot<'a>(config: &'a mut Config, key: &str) -> Option<&'a mut Option<Identity>> {
    match key.split_once('_').map(|(side, _)| side) {
        Some("customer") => Some(&mut config.customer),
        Some("driver") => Some(&mut config.driver),
        _ => None,
    }
}

/// Set the name or email of an identity. An empty name removes the identity.
fn set_identity_field(slot: &mut Option<Identity>, field: &str, value: String) -> bool {
    match field {
        "name" if value.is_empty() => *slot = None,
        "name" => match slot {
            Some(identity) => identity.name = value,
            None => *slot = Some(Identity::new(value, None)),
        },
        "email" => {
            let email = (!value.is_empty()).then_some(value);
            match slot {
                Some(identity) => identity.email = email,
                None => return false,
            }
        }
        _ => return false,
    }
    true
}

pub async fn execute(key: Option<String>, value: Option<String>) -> Result<()> {
    let mut config = Config::load_with_env()?;

    match (key.as_deref(), value) {
        (None, None) => {
            // Show all config
            println!("Current Configuration");
            println!("=====================");
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        (Some(key), None) => {
            // Get specific key
            match key {
                "store_dir" => println!("{:?}", config.store_dir),
                "backend" => println!("{}", config.backend),
                "poll_interval_ms" => println!("{}", config.poll_interval_ms),
                "push_enabled" => println!("{}", config.push_enabled),
                "default_order_id" => println!("{}", config.default_order_id),
                "customer" => println!("{:?}", config.customer),
                "driver" => println!("{:?}", config.driver),
                _ => println!("Unknown config key: {}", key),
            }
        }
        (Some(key), Some(value)) => {
            // Set specific key
            match key {
                "store_dir" => {
                    config.store_dir = value.into();
                    config.save()?;
                    println!("Set store_dir = {:?}", config.store_dir);
                }
                "backend" => {
                    config.backend = value.parse()?;
                    config.save()?;
                    println!("Set backend = {}", config.backend);
                }
                "poll_interval_ms" => {
                    config.poll_interval_ms = value.parse()?;
                    config.save()?;
                    println!("Set poll_interval_ms = {}", config.poll_interval_ms);
                }
                "push_enabled" => {
                    config.push_enabled = value.parse()?;
                    config.save()?;
                    println!("Set push_enabled = {}", config.push_enabled);
                }
                "default_order_id" => {
                    config.default_order_id = value;
                    config.save()?;
                    println!("Set default_order_id = {}", config.default_order_id);
                }
                "customer_name" | "customer_email" | "driver_name" | "driver_email" => {
                    let field = key.rsplit('_').next().unwrap_or_default();
                    let applied = match identity_slot(&mut config, key) {
                        Some(slot) => set_identity_field(slot, field, value),
                        None => false,
                    };
                    if applied {
                        config.save()?;
                        println!("Set {}", key);
                    } else {
                        println!("Set a name before setting {}", key);
                    }
                }
                _ => println!("Cannot set config key: {}", key),
            }
        }
        (None, Some(_)) => {
            println!("Must specify a key to set a value");
        }
    }

    Ok(())
}
