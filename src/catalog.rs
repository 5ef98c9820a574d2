use std::time::Duration;

use serde::Deserialize;

use crate::{
    error::{Result, SprintError},
    transport::ProxyConfig,
};

const CATALOG_URL: &str = "https://www.speedtest.net/api/js/servers?engine=js";
const IDENTITY_URL: &str = "https://www.speedtest.net/speedtest-config.php";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// One entry from the measurement-server catalog. Everything except `host`
/// and `latency_ms` is pass-through metadata kept for reporting.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Server {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub lat: String,
    #[serde(default)]
    pub lon: String,
    #[serde(default)]
    pub distance: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub cc: String,
    #[serde(default)]
    pub sponsor: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub preferred: i64,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub force_ping_select: i64,
    /// Mean ping observed during selection; written once per scan.
    #[serde(skip)]
    pub latency_ms: i64,
}

/// Caller identity as reported by the catalog operator.
#[derive(Debug, Clone, Default)]
pub struct User {
    pub ip: String,
    pub lat: String,
    pub lon: String,
    pub isp: String,
}

/// One HTTP client for both lookups, routed through the SOCKS5 proxy when
/// one is configured.
pub fn http_client(proxy: Option<&ProxyConfig>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(HTTP_TIMEOUT);
    if let Some(proxy) = proxy {
        builder = builder
            .proxy(reqwest::Proxy::all(proxy.socks_url())?)
            .danger_accept_invalid_certs(true);
    }
    Ok(builder.build()?)
}

pub async fn fetch_servers(http: &reqwest::Client) -> Result<Vec<Server>> {
    let servers = http
        .get(CATALOG_URL)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(servers)
}

pub async fn fetch_user(http: &reqwest::Client) -> Result<User> {
    let body = http
        .get(IDENTITY_URL)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    parse_identity(&body)
}

/// The identity endpoint answers with XML; only the attributes of the
/// `<client>` element matter, so they are scanned out directly.
fn parse_identity(body: &str) -> Result<User> {
    let fragment = body
        .split("<client ")
        .nth(1)
        .ok_or_else(|| SprintError::Protocol("identity response has no client element".into()))?;
    let element = fragment.split('>').next().unwrap_or(fragment);

    let ip = attr(element, "ip")
        .ok_or_else(|| SprintError::Protocol("identity response has no ip attribute".into()))?;
    Ok(User {
        ip,
        lat: attr(element, "lat").unwrap_or_default(),
        lon: attr(element, "lon").unwrap_or_default(),
        isp: attr(element, "isp").unwrap_or_default(),
    })
}

fn attr(element: &str, name: &str) -> Option<String> {
    let needle = format!("{name}=\"");
    let mut search = element;
    let mut offset = 0;
    while let Some(pos) = search.find(&needle) {
        let at_boundary = offset + pos == 0
            || element.as_bytes()[offset + pos - 1].is_ascii_whitespace();
        if at_boundary {
            let rest = &search[pos + needle.len()..];
            return rest.split('"').next().map(str::to_string);
        }
        offset += pos + needle.len();
        search = &element[offset..];
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
        "<settings>\n",
        "<client ip=\"203.0.113.7\" lat=\"52.52\" lon=\"13.405\" ",
        "isp=\"Example Telecom\" isprating=\"3.7\" rating=\"0\" />\n",
        "<server-config threadcount=\"4\"/>\n",
        "</settings>"
    );

    #[test]
    fn identity_attributes_are_extracted() {
        let user = parse_identity(SAMPLE).unwrap();
        assert_eq!(user.ip, "203.0.113.7");
        assert_eq!(user.lat, "52.52");
        assert_eq!(user.lon, "13.405");
        assert_eq!(user.isp, "Example Telecom");
    }

    #[test]
    fn attribute_names_do_not_match_inside_other_names() {
        // "ip" must not match the tail of "isp", nor "rating" inside "isprating".
        let element = "isp=\"Foo\" isprating=\"3.7\" ip=\"198.51.100.1\" rating=\"0\"";
        assert_eq!(attr(element, "ip").as_deref(), Some("198.51.100.1"));
        assert_eq!(attr(element, "rating").as_deref(), Some("0"));
    }

    #[test]
    fn missing_client_element_is_an_error() {
        assert!(parse_identity("<settings></settings>").is_err());
    }

    #[test]
    fn catalog_entries_deserialize_with_missing_fields() {
        let raw = r#"[{"id":"1234","host":"example.net:8080","sponsor":"Example"}]"#;
        let servers: Vec<Server> = serde_json::from_str(raw).unwrap();
        assert_eq!(servers[0].host, "example.net:8080");
        assert_eq!(servers[0].latency_ms, 0);
    }
}
