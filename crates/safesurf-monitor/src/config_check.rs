use std::path::Path;

use safesurf_core::RiskLevel;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CheckResult {
    pub name: &'static str,
    pub severity: Severity,
    pub passed: bool,
    pub message: String,
}

#[derive(Debug, Default)]
pub(crate) struct CheckReport {
    pub results: Vec<CheckResult>,
}

impl CheckReport {
    pub(crate) fn push(&mut self, result: CheckResult) {
        self.results.push(result);
    }

    fn check(&mut self, name: &'static str, severity: Severity, passed: bool, message: String) {
        self.push(CheckResult {
            name,
            severity,
            passed,
            message,
        });
    }

    pub(crate) fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn has_warnings(&self) -> bool {
        self.warning_count() > 0
    }

    fn error_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.severity == Severity::Error && !r.passed)
            .count()
    }

    fn warning_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.severity == Severity::Warning && !r.passed)
            .count()
    }

    fn format_result(r: &CheckResult) -> String {
        let icon = if r.severity == Severity::Info {
            "·"
        } else if r.passed {
            "✓"
        } else {
            match r.severity {
                Severity::Warning => "⚠",
                _ => "✗",
            }
        };
        format!("{icon} {}", r.message)
    }

    pub(crate) fn to_summary_string(&self) -> String {
        let mut lines: Vec<String> = self.results.iter().map(Self::format_result).collect();
        let errors = self.error_count();
        let warnings = self.warning_count();
        if errors == 0 && warnings == 0 {
            lines.push("\nall checks passed".to_owned());
        } else {
            lines.push(format!("\n{errors} error(s), {warnings} warning(s)"));
        }
        lines.join("\n")
    }

    pub(crate) fn print_human(&self) {
        println!("{}", self.to_summary_string());
    }

    pub(crate) fn print_json(&self) {
        let value = self.to_json_value();
        println!(
            "{}",
            serde_json::to_string_pretty(&value).unwrap_or_default()
        );
    }

    pub(crate) fn to_json_value(&self) -> serde_json::Value {
        let checks: Vec<serde_json::Value> = self
            .results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "name": r.name,
                    "severity": r.severity.as_str(),
                    "passed": r.passed,
                    "message": r.message,
                })
            })
            .collect();
        serde_json::json!({
            "passed": !self.has_errors(),
            "errors": self.error_count(),
            "warnings": self.warning_count(),
            "checks": checks,
        })
    }
}

pub(crate) fn validate_config(config_path: &Path) -> CheckReport {
    let mut report = CheckReport::default();

    // 1. toml_parse
    let config = if config_path.exists() {
        match Config::load(config_path) {
            Ok(c) => {
                report.check(
                    "toml_parse",
                    Severity::Error,
                    true,
                    format!("config syntax valid ({})", config_path.display()),
                );
                c
            }
            Err(e) => {
                report.check("toml_parse", Severity::Error, false, format!("{e:#}"));
                return report;
            }
        }
    } else {
        report.check(
            "toml_parse",
            Severity::Info,
            true,
            format!("{} not found, using defaults", config_path.display()),
        );
        Config::default()
    };

    check_backend(&mut report, &config);
    check_classifier(&mut report, &config);
    check_monitor(&mut report, &config);
    check_overlay(&mut report, &config);
    check_notifications(&mut report, &config);

    report
}

fn check_backend(report: &mut CheckReport, config: &Config) {
    let url = config.backend.url.trim();
    let scheme_ok = url.starts_with("http://") || url.starts_with("https://");
    report.check(
        "backend_url",
        Severity::Error,
        scheme_ok,
        if scheme_ok {
            format!("backend: {url}")
        } else {
            format!("backend.url must start with http:// or https://, got '{url}'")
        },
    );

    let timeout_ok = config.backend.timeout_secs > 0;
    report.check(
        "backend_timeout",
        Severity::Error,
        timeout_ok,
        if timeout_ok {
            format!("backend timeout: {}s", config.backend.timeout_secs)
        } else {
            "backend.timeout_secs must be greater than 0".to_owned()
        },
    );
}

fn check_classifier(report: &mut CheckReport, config: &Config) {
    let classifier = &config.classifier;

    let delay_ok = classifier.retry_delay_ms > 0 || classifier.max_retries == 0;
    report.check(
        "retry_delay",
        Severity::Warning,
        delay_ok,
        if delay_ok {
            format!(
                "retries: {} x {}ms",
                classifier.max_retries, classifier.retry_delay_ms
            )
        } else {
            "classifier.retry_delay_ms is 0; retries will hit the backend back to back".to_owned()
        },
    );

    report.check(
        "fallback_risk",
        Severity::Info,
        true,
        if classifier.fallback_risk == RiskLevel::Trusted {
            "unreachable backend: sites treated as trusted (fail-open)".to_owned()
        } else {
            format!(
                "unreachable backend: sites treated as {}",
                classifier.fallback_risk
            )
        },
    );
}

fn check_monitor(report: &mut CheckReport, config: &Config) {
    let cooldown_ok = config.monitor.cooldown_ms > 0;
    report.check(
        "cooldown",
        Severity::Error,
        cooldown_ok,
        if cooldown_ok {
            format!("per-destination cooldown: {}ms", config.monitor.cooldown_ms)
        } else {
            "monitor.cooldown_ms must be greater than 0".to_owned()
        },
    );

    let id_ok = !config.monitor.id.trim().is_empty();
    report.check(
        "monitor_id",
        Severity::Error,
        id_ok,
        if id_ok {
            format!("socket: {}", config.socket_path().display())
        } else {
            "monitor.id must be non-empty".to_owned()
        },
    );
}

fn check_overlay(report: &mut CheckReport, config: &Config) {
    let overlay = &config.overlay;
    let zero: Vec<&str> = [
        ("entrance_ms", overlay.entrance_ms),
        ("display_ms", overlay.display_ms),
        ("exit_ms", overlay.exit_ms),
        ("result_ms", overlay.result_ms),
    ]
    .into_iter()
    .filter(|(_, ms)| *ms == 0)
    .map(|(name, _)| name)
    .collect();

    let durations_ok = zero.is_empty();
    report.check(
        "overlay_durations",
        Severity::Error,
        durations_ok,
        if durations_ok {
            format!(
                "overlay: {}ms in, {}ms shown, {}ms out",
                overlay.entrance_ms, overlay.display_ms, overlay.exit_ms
            )
        } else {
            format!("overlay durations must be non-zero: {}", zero.join(", "))
        },
    );

    let order_ok = overlay.entrance_ms < overlay.display_ms;
    report.check(
        "overlay_order",
        Severity::Warning,
        order_ok,
        if order_ok {
            "overlay entrance completes before exit".to_owned()
        } else {
            "overlay.display_ms should exceed overlay.entrance_ms".to_owned()
        },
    );
}

fn check_notifications(report: &mut CheckReport, config: &Config) {
    let notifications = &config.notifications;
    if !notifications.enabled {
        report.check(
            "notifications",
            Severity::Info,
            true,
            "desktop notifications disabled".to_owned(),
        );
        return;
    }

    match &notifications.command {
        None => report.check(
            "notifications",
            Severity::Info,
            true,
            "notifications are logged (no command configured)".to_owned(),
        ),
        Some(command) => {
            let ok = command.first().is_some_and(|program| !program.is_empty());
            report.check(
                "notify_command",
                Severity::Error,
                ok,
                if ok {
                    format!("notify command: {}", command.join(" "))
                } else {
                    "notifications.command must name a program".to_owned()
                },
            );
        }
    }
}
