//! Model status and health commands

use crate::client::ApiClient;
use crate::output;
use anyhow::Result;
use colored::Colorize;

/// Print per-model loaded state and retrain recency.
pub async fn run(client: &ApiClient, json: bool) -> Result<()> {
    let status = client.model_status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", output::status_table(&status));

    let unloaded = status.values().filter(|s| !s.is_loaded).count();
    if unloaded > 0 {
        println!(
            "{}",
            format!("{unloaded} model(s) not loaded; predictions against them will fail")
                .yellow()
        );
    }
    Ok(())
}

/// Print the health and readiness documents.
pub async fn health(client: &ApiClient, json: bool) -> Result<()> {
    let health = client.health().await?;
    let readiness = client.readiness().await.unwrap_or_else(|e| {
        serde_json::json!({ "ready": false, "reason": e.to_string() })
    });

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "health": health,
                "readiness": readiness,
            }))?
        );
        return Ok(());
    }

    let status = health["status"].as_str().unwrap_or("unknown");
    let status_colored = match status {
        "healthy" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        _ => status.red().to_string(),
    };
    println!("status: {status_colored}");

    if let Some(components) = health["components"].as_object() {
        for (name, component) in components {
            let component_status = component["status"].as_str().unwrap_or("unknown");
            println!("  {name}: {component_status}");
        }
    }

    let ready = readiness["ready"].as_bool().unwrap_or(false);
    println!(
        "ready: {}",
        if ready {
            "yes".green().to_string()
        } else {
            "no".red().to_string()
        }
    );
    Ok(())
}
