use {
    anyhow::Result,
    courier_api::{
        WebhookInfo,
        methods::{DeleteWebhook, GetWebhookInfo},
    },
};

use crate::setup::{self, Loaded};

pub async fn webhook_info(loaded: Loaded) -> Result<()> {
    let client = setup::client(&loaded.config)?;
    let info = client.send(&GetWebhookInfo::default()).await?;
    for line in describe(&info) {
        println!("{line}");
    }
    Ok(())
}

pub async fn delete_webhook(loaded: Loaded, drop_pending_updates: bool) -> Result<()> {
    let client = setup::client(&loaded.config)?;
    client
        .send(&DeleteWebhook {
            drop_pending_updates: drop_pending_updates.then_some(true),
        })
        .await?;
    println!("Webhook removed.");
    Ok(())
}

fn describe(info: &WebhookInfo) -> Vec<String> {
    if info.url.is_empty() {
        return vec![
            "No webhook registered (the bot receives updates by polling).".to_string(),
            format!("Pending:      {}", info.pending_update_count),
        ];
    }

    let mut lines = vec![
        format!("URL:          {}", info.url),
        format!("Pending:      {}", info.pending_update_count),
        format!("Certificate:  {}", if info.has_custom_certificate { "custom" } else { "none" }),
    ];
    if let Some(ip) = &info.ip_address {
        lines.push(format!("IP address:   {ip}"));
    }
    if let Some(max) = info.max_connections {
        lines.push(format!("Connections:  {max}"));
    }
    if let Some(allowed) = &info.allowed_updates {
        lines.push(format!("Updates:      {}", allowed.join(", ")));
    }
    if let Some(message) = &info.last_error_message {
        lines.push(format!("Last error:   {message}"));
    }
    lines
}
