use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use std::path::Path;

use crate::context::AppContext;

/// Turn `key=value` pairs into a JSON patch. Values that parse as JSON keep
/// their type; anything else is sent as a string.
pub fn parse_assignments(pairs: &[String]) -> Result<Value> {
    let mut patch = Map::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("Expected key=value, got '{}'", pair);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Empty field name in '{}'", pair);
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        patch.insert(key.to_string(), value);
    }
    Ok(Value::Object(patch))
}

pub fn guess_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

pub async fn set(ctx: &AppContext, pairs: &[String]) -> Result<()> {
    let patch = parse_assignments(pairs)?;
    match ctx.session.save_profile(&patch).await {
        Ok(user) => {
            println!("✓ Profile updated for {}", user.display_name());
            Ok(())
        }
        Err(e) => bail!("{}", e.user_message()),
    }
}

pub async fn photo(ctx: &AppContext, file: &Path) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("photo");

    match ctx
        .session
        .upload_profile_photo(file_name, bytes, guess_mime(file))
        .await
    {
        Ok(user) => {
            println!(
                "✓ Photo updated: {}",
                user.profile_image_url.as_deref().unwrap_or("(none)")
            );
            Ok(())
        }
        Err(e) => bail!("{}", e.user_message()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_assignments_keeps_json_types() {
        let patch = parse_assignments(&[
            "first_name=Ada".to_string(),
            "newsletter=true".to_string(),
            "phone=\"0123\"".to_string(),
        ])
        .unwrap();
        assert_eq!(
            patch,
            json!({"first_name": "Ada", "newsletter": true, "phone": "0123"})
        );
    }

    #[test]
    fn test_parse_assignments_rejects_garbage() {
        assert!(parse_assignments(&["no-equals".to_string()]).is_err());
        assert!(parse_assignments(&["=x".to_string()]).is_err());
    }

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime(Path::new("me.PNG")), "image/png");
        assert_eq!(guess_mime(Path::new("me.jpeg")), "image/jpeg");
        assert_eq!(guess_mime(Path::new("me")), "application/octet-stream");
    }
}
