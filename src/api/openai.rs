use crate::config::Config;
use crate::{logi, logw};
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::json;

const MAX_TOPIC_CHARS: usize = 500;

static LIST_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*(?:[-*•]+|\d+[.):]|\(\d+\))\s*"#).expect("list marker regex is valid")
});

fn trim_copy_utf8_safe(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input.to_string();
    }

    let mut cut = max_bytes.min(input.len());
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    input[..cut].to_string()
}

fn openai_extract_output_text(resp_json: &str) -> Option<String> {
    let root: serde_json::Value = serde_json::from_str(resp_json).ok()?;

    if let Some(err) = root.get("error").filter(|e| !e.is_null()) {
        if let Some(msg) = err.get("message").and_then(|v| v.as_str()) {
            logw(format!("OpenAI error message: {}", msg));
        }
        if let Some(code) = err.get("code").and_then(|v| v.as_str()) {
            logw(format!("OpenAI error code: {}", code));
        }
        return None;
    }

    let output = root.get("output")?.as_array()?;
    for item in output {
        let Some(content) = item.get("content").and_then(|v| v.as_array()) else {
            continue;
        };
        for entry in content {
            let typ = entry.get("type").and_then(|v| v.as_str());
            let text = entry.get("text").and_then(|v| v.as_str());
            if let (Some("output_text"), Some(text)) = (typ, text) {
                return Some(text.to_string());
            }
        }
    }

    None
}

/// One line per cue: strips numbering and bullets and drops blank lines.
pub fn clean_script(raw: &str) -> String {
    raw.lines()
        .map(|line| LIST_MARKER_RE.replace(line, "").trim().trim_matches('"').to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn script_prompt(topic: &str, style: &str, duration_secs: f64) -> String {
    format!(
        "Generate a {duration}-second {style} reel script about \"{topic}\".\n\nRequirements:\n- Create 5-7 short, punchy lines (each line should be 1-2 sentences max)\n- Each line should be impactful and engaging\n- Style: {style}\n- Format: Return each line on a new line, no numbering\n- Keep it concise for a {duration}-second video\n- Make it viral-worthy and attention-grabbing",
        duration = duration_secs.round() as i64,
    )
}

/// Asks the model for a multi-line reel script. Fails when the request fails
/// or the reply has no usable lines.
pub async fn openai_write_script(
    client: &Client,
    cfg: &Config,
    topic: &str,
    style: &str,
    duration_secs: f64,
) -> Result<String> {
    let topic = trim_copy_utf8_safe(topic.trim(), MAX_TOPIC_CHARS);
    let style = trim_copy_utf8_safe(style.trim(), MAX_TOPIC_CHARS);
    let prompt = script_prompt(&topic, &style, duration_secs);

    let body = json!({
        "model": cfg.openai_model,
        "input": [
            {"role": "user", "content": prompt},
        ],
    });

    let resp = client
        .post("https://api.openai.com/v1/responses")
        .bearer_auth(&cfg.openai_key)
        .json(&body)
        .timeout(std::time::Duration::from_secs(300))
        .send()
        .await
        .context("OpenAI request failed")?;

    let status = resp.status();
    let raw = resp.text().await.unwrap_or_default();

    if !status.is_success() {
        if !raw.is_empty() {
            let snippet = raw.chars().take(800).collect::<String>();
            logw(format!("OpenAI raw body: {}", snippet));
        }
        anyhow::bail!("OpenAI HTTP {}", status.as_u16());
    }

    let Some(text) = openai_extract_output_text(&raw) else {
        let snippet = raw.chars().take(800).collect::<String>();
        logw(format!("OpenAI raw body: {}", snippet));
        anyhow::bail!("OpenAI response parse failed");
    };

    let script = clean_script(&text);
    if script.is_empty() {
        anyhow::bail!("No script generated from AI");
    }
    logi(format!("OpenAI script received: {} lines", script.lines().count()));
    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_output_text() {
        let body = r#"{"output":[{"type":"reasoning"},{"content":[{"type":"output_text","text":"Line one\nLine two"}]}]}"#;
        assert_eq!(
            openai_extract_output_text(body).as_deref(),
            Some("Line one\nLine two")
        );
    }

    #[test]
    fn error_bodies_yield_nothing() {
        let body = r#"{"error":{"message":"bad key","code":"invalid_api_key"}}"#;
        assert!(openai_extract_output_text(body).is_none());
        assert!(openai_extract_output_text("not json").is_none());
    }

    #[test]
    fn clean_script_strips_list_markers() {
        let raw = "1. Wake up early.\n\n- Move your body\n2) \"Drink water\"\n(3) Repeat\n• Win";
        assert_eq!(
            clean_script(raw),
            "Wake up early.\nMove your body\nDrink water\nRepeat\nWin"
        );
    }

    #[test]
    fn clean_script_keeps_leading_numbers_that_are_content() {
        assert_eq!(clean_script("10 reasons to smile"), "10 reasons to smile");
    }

    #[test]
    fn prompt_mentions_topic_style_and_duration() {
        let prompt = script_prompt("coffee", "funny", 29.6);
        assert!(prompt.contains("30-second funny reel script about \"coffee\""));
    }

    #[test]
    fn trim_respects_char_boundaries() {
        assert_eq!(trim_copy_utf8_safe("héllo", 2), "h");
        assert_eq!(trim_copy_utf8_safe("abc", 10), "abc");
    }
}
