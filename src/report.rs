use serde::Serialize;

/// The one externally visible artifact: printed as a single JSON line. Field
/// names and nesting are frozen for drop-in compatibility with consumers of
/// the report.
#[derive(Debug, Default, Serialize)]
pub struct SpeedReport {
    pub ip: String,
    pub download: f64,
    pub upload: f64,
    pub ping: i64,
    pub server: ServerReport,
}

#[derive(Debug, Default, Serialize)]
pub struct ServerReport {
    pub latency: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_layout_is_frozen() {
        let report = SpeedReport {
            ip: "203.0.113.7".to_string(),
            download: 94.25,
            upload: 35.5,
            ping: 18,
            server: ServerReport { latency: 18 },
        };
        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(
            json,
            r#"{"ip":"203.0.113.7","download":94.25,"upload":35.5,"ping":18,"server":{"latency":18}}"#
        );
    }
}
