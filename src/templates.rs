use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tera::Tera;

use crate::config::{
    UiConfig, SECONDS_PER_DAY, SECONDS_PER_HOUR, SECONDS_PER_MINUTE, SECONDS_PER_MONTH,
    SECONDS_PER_YEAR,
};
use crate::error::AppError;

/// Templates compiled into the binary, used unless `ui.templates_dir` is set.
const EMBEDDED_TEMPLATES: [(&str, &str); 5] = [
    ("base.html", include_str!("../templates/base.html")),
    ("macros.html", include_str!("../templates/macros.html")),
    ("thread.html", include_str!("../templates/thread.html")),
    ("email.html", include_str!("../templates/email.html")),
    ("list.html", include_str!("../templates/list.html")),
];

/// Initialize the Tera template engine
pub fn init_templates(ui: &UiConfig) -> Result<Tera, AppError> {
    let mut tera = match &ui.templates_dir {
        Some(dir) => {
            tracing::info!(%dir, "Loading templates from disk");
            Tera::new(&format!("{}/**/*.html", dir.trim_end_matches('/')))?
        }
        None => {
            let mut tera = Tera::default();
            tera.add_raw_templates(EMBEDDED_TEMPLATES)?;
            tera
        }
    };

    tera.register_filter("isodate", isodate_filter);
    tera.register_filter("timeago", timeago_filter);

    Ok(tera)
}

fn epoch_arg(value: &tera::Value, filter: &str) -> tera::Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| tera::Error::msg(format!("{} filter expects an epoch in seconds", filter)))
}

/// Format an epoch as `YYYY-MM-DD HH:MM UTC`
fn isodate_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let epoch = epoch_arg(value, "isodate")?;
    let formatted = DateTime::<Utc>::from_timestamp(epoch, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_default();
    Ok(tera::Value::String(formatted))
}

/// Convert an epoch to a human-readable relative time (e.g., "2 hours ago")
fn timeago_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let epoch = epoch_arg(value, "timeago")?;
    let seconds = Utc::now().timestamp() - epoch;
    Ok(tera::Value::String(relative_time(seconds)))
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", count, unit)
    }
}

fn relative_time(seconds: i64) -> String {
    if seconds < 0 {
        "in the future".to_string()
    } else if seconds < SECONDS_PER_MINUTE {
        "just now".to_string()
    } else if seconds < SECONDS_PER_HOUR {
        plural(seconds / SECONDS_PER_MINUTE, "minute")
    } else if seconds < SECONDS_PER_DAY {
        plural(seconds / SECONDS_PER_HOUR, "hour")
    } else if seconds < SECONDS_PER_MONTH {
        plural(seconds / SECONDS_PER_DAY, "day")
    } else if seconds < SECONDS_PER_YEAR {
        plural(seconds / SECONDS_PER_MONTH, "month")
    } else {
        plural(seconds / SECONDS_PER_YEAR, "year")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_args() -> HashMap<String, tera::Value> {
        HashMap::new()
    }

    #[test]
    fn test_embedded_templates_parse() {
        let tera = init_templates(&UiConfig::default()).unwrap();
        let names: Vec<&str> = tera.get_template_names().collect();
        for (name, _) in EMBEDDED_TEMPLATES {
            assert!(names.contains(&name), "missing {}", name);
        }
    }

    #[test]
    fn test_templates_dir_override() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("thread.html"), "custom {{ title }}").unwrap();
        let ui = UiConfig {
            templates_dir: Some(dir.path().to_string_lossy().into_owned()),
            ..UiConfig::default()
        };
        let tera = init_templates(&ui).unwrap();
        let mut context = tera::Context::new();
        context.insert("title", "x");
        assert_eq!(tera.render("thread.html", &context).unwrap(), "custom x");
    }

    #[test]
    fn test_isodate_filter() {
        assert_eq!(
            isodate_filter(&json!(1577836800), &no_args()).unwrap(),
            json!("2020-01-01 00:00 UTC")
        );
    }

    #[test]
    fn test_relative_time() {
        assert_eq!(relative_time(-5), "in the future");
        assert_eq!(relative_time(10), "just now");
        assert_eq!(relative_time(60), "1 minute ago");
        assert_eq!(relative_time(7200), "2 hours ago");
        assert_eq!(relative_time(SECONDS_PER_DAY * 3), "3 days ago");
        assert_eq!(relative_time(SECONDS_PER_YEAR * 2), "2 years ago");
    }
}
