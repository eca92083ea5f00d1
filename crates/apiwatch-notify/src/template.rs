use apiwatch_common::types::Alert;

/// Subject line for email delivery.
pub fn email_subject(alert: &Alert) -> String {
    format!(
        "[apiwatch][{}] {} alert - {}",
        alert.severity, alert.kind, alert.source
    )
}

/// Plain-text email body.
pub fn email_body(alert: &Alert) -> String {
    let details = serde_json::to_string_pretty(&alert.details).unwrap_or_default();
    let details_block = if alert.details.is_null() {
        String::new()
    } else {
        format!("\n\nAdditional details:\n{details}")
    };
    format!(
        "Alert details:\nSeverity: {severity}\nTime: {time}\nSource: {source}\nSource id: {source_id}\n\nMessage:\n{message}{details_block}",
        severity = alert.severity,
        time = alert.created_at.to_rfc3339(),
        source = alert.source,
        source_id = alert.source_id,
        message = alert.message,
        details_block = details_block,
    )
}

/// Slack Block Kit payload for the incoming-webhook API.
pub fn slack_blocks(alert: &Alert) -> serde_json::Value {
    serde_json::json!({
        "blocks": [
            {
                "type": "header",
                "text": {
                    "type": "plain_text",
                    "text": format!("{} alert - {}", alert.severity, alert.source),
                }
            },
            {
                "type": "section",
                "fields": [
                    {
                        "type": "mrkdwn",
                        "text": format!("*Time:*\n{}", alert.created_at.to_rfc3339()),
                    },
                    {
                        "type": "mrkdwn",
                        "text": format!("*Source:*\n{}", alert.source),
                    }
                ]
            },
            {
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": alert.message.clone(),
                }
            }
        ]
    })
}
