use crate::alerts::{AlertSink, SinkError};
use crate::config::TelegramConfig;
use crate::evaluator::{Issue, Severity};
use crate::reading::HostInfo;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ParseMode};
use tracing::warn;

/// Sends issue batches to every allowed Telegram chat.
pub struct TelegramSink {
    bot: Bot,
    chat_ids: Vec<i64>,
    host: HostInfo,
}

impl TelegramSink {
    pub fn new(token: String, cfg: &TelegramConfig, host: HostInfo) -> Self {
        Self {
            bot: Bot::new(token),
            chat_ids: cfg.allowed_chat_ids.clone(),
            host,
        }
    }
}

#[async_trait]
impl AlertSink for TelegramSink {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn deliver(&self, issues: &[Issue]) -> Result<(), SinkError> {
        let text = format_issues(&self.host, issues);
        let mut last_error = None;

        for chat_id in &self.chat_ids {
            if let Err(err) = self
                .bot
                .send_message(ChatId(*chat_id), text.clone())
                .parse_mode(ParseMode::Html)
                .await
            {
                warn!(chat_id = *chat_id, error = %err, "failed to send telegram alert");
                last_error = Some(err);
            }
        }

        match last_error {
            Some(err) => Err(SinkError::Telegram(err)),
            None => Ok(()),
        }
    }
}

/// Picks the bot token from the environment first, then from the config file.
pub fn resolve_token(cfg: &TelegramConfig) -> Result<String, String> {
    if cfg.allowed_chat_ids.is_empty() {
        return Err(
            "telegram.allowed_chat_ids is empty: list at least one chat id in the config"
                .to_string(),
        );
    }

    if let Ok(v) = std::env::var(&cfg.bot_token_env) {
        if !v.trim().is_empty() {
            return Ok(v);
        }
    }
    if let Some(v) = cfg
        .bot_token
        .as_ref()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    {
        return Ok(v);
    }

    Err(format!(
        "telegram token not found: set '{}' in the environment or telegram.bot_token in the config",
        cfg.bot_token_env
    ))
}

fn format_issues(host: &HostInfo, issues: &[Issue]) -> String {
    let mut out = format!(
        "<b>Resource alerts on {}</b>",
        escape_html(host.display_name())
    );
    for issue in issues {
        let marker = match issue.severity {
            Severity::Critical => "🔥",
            _ => "⚠",
        };
        out.push_str(&format!(
            "\n{marker} <b>{}</b> [{}] {}\n{}",
            issue.category,
            issue.severity,
            escape_html(&issue.message),
            escape_html(&issue.details)
        ));
    }
    out
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::Category;

    fn cfg() -> TelegramConfig {
        TelegramConfig {
            enabled: true,
            bot_token_env: "RESMON_TEST_TOKEN_UNSET_9731".to_string(),
            bot_token: None,
            allowed_chat_ids: vec![42],
        }
    }

    #[test]
    fn token_requires_chat_ids_and_a_source() {
        std::env::remove_var("RESMON_TEST_TOKEN_UNSET_9731");
        let mut cfg = cfg();
        assert!(resolve_token(&cfg).is_err());

        cfg.bot_token = Some("  123:abc  ".to_string());
        assert_eq!(resolve_token(&cfg).unwrap(), "123:abc");

        cfg.allowed_chat_ids.clear();
        assert!(resolve_token(&cfg).is_err());
    }

    #[test]
    fn message_lists_issues_with_escaping() {
        let host = HostInfo {
            host_name: Some("web<1>".to_string()),
            platform: None,
        };
        let issues = vec![
            Issue {
                category: Category::Memory,
                severity: Severity::Critical,
                message: "High RAM usage: 93.0%".to_string(),
                details: "Available: 1.00 GB".to_string(),
                suggestion: String::new(),
            },
            Issue {
                category: Category::Disk,
                severity: Severity::High,
                message: "Disk space low: /a&b (88.0%)".to_string(),
                details: String::new(),
                suggestion: String::new(),
            },
        ];
        let text = format_issues(&host, &issues);
        assert!(text.starts_with("<b>Resource alerts on web&lt;1&gt;</b>"));
        assert!(text.contains("🔥 <b>Memory</b> [Critical] High RAM usage: 93.0%"));
        assert!(text.contains("⚠ <b>Disk</b> [High] Disk space low: /a&amp;b (88.0%)"));
    }
}
