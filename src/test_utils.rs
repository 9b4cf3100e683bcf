use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Duration;

use crate::oui::fetcher::RegistrySource;
use crate::oui::types::FetchError;
use crate::oui::{OuiCache, Store};

/// Column header block that opens every IEEE export.
pub const REGISTRY_HEADER: &str = "OUI/MA-L                                                    Organization\n\
company_id                                                  Organization\n\
                                                            Address\n\n";

/// Render one assignment block the way the IEEE export lays it out.
pub fn registry_block(oui: u32, name: &str, address: &[&str]) -> String {
    let hex = format!("{:06X}", oui);
    let mut block = format!(
        "{}-{}-{}   (hex)\t\t{}\n{}     (base 16)\t\t{}\n",
        &hex[0..2],
        &hex[2..4],
        &hex[4..6],
        name,
        hex,
        name
    );
    for line in address {
        block.push_str("\t\t\t\t");
        block.push_str(line);
        block.push('\n');
    }
    block.push('\n');
    block
}

/// Synthetic registry with `count` assignments, prefixes 00-00-01 upwards.
pub fn sample_registry(count: u32) -> String {
    let mut text = REGISTRY_HEADER.to_string();
    for i in 1..=count {
        let street = format!("{} Main Street", i);
        let name = format!("Vendor {} Corporation", i);
        text.push_str(&registry_block(i, &name, &[&street, "Springfield CA 90210", "US"]));
    }
    text
}

/// Registry covering the vendors used across lookup and search tests.
pub fn known_vendors_registry() -> String {
    let mut text = REGISTRY_HEADER.to_string();
    text.push_str(&registry_block(
        0x005056,
        "VMware, Inc.",
        &["3401 Hillview Avenue", "PALO ALTO CA 94304", "US"],
    ));
    text.push_str(&registry_block(0x001B21, "Zebra Corp", &["Lincolnshire IL", "US"]));
    text.push_str(&registry_block(0x00E04C, "Apple Inc", &["Cupertino CA", "US"]));
    text.push_str(&registry_block(0x080027, "Acme", &[]));
    text
}

/// Registry source that serves a canned body and counts fetch attempts.
pub struct StubSource {
    body: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl StubSource {
    pub fn serving(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            body: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter that stays readable after the source is boxed.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl RegistrySource for StubSource {
    fn fetch(&self) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.body {
            Some(body) => Ok(body.clone()),
            None => Err(FetchError::NoMirrors),
        }
    }
}

/// In-memory cache wired to `source`, with the default seven day max age.
pub fn test_cache(source: StubSource) -> (OuiCache, Arc<AtomicUsize>) {
    let counter = source.counter();
    let store = Store::open_in_memory().expect("Failed to create in-memory store");
    let cache = OuiCache::new(store, Box::new(source), Duration::days(7));
    (cache, counter)
}

/// Serve exactly one HTTP response on a loopback port and return its URL.
pub fn serve_once(
    status_line: &str,
    headers: &[(&str, String)],
    body: impl Into<Vec<u8>>,
) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read listener address");
    let mut response = format!("HTTP/1.1 {}\r\nConnection: close\r\n", status_line);
    for (name, value) in headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str("\r\n");
    let mut response = response.into_bytes();
    let body: Vec<u8> = body.into();
    response.extend_from_slice(&body);

    std::thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while let Ok(n) = stream.read(&mut buf) {
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let _ = stream.write_all(&response);
            let _ = stream.flush();
        }
    });

    format!("http://{}/oui.txt", addr)
}

/// Accept one connection and hold it open for `hold` without ever answering.
pub fn serve_silent(hold: std::time::Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read listener address");

    std::thread::spawn(move || {
        if let Ok((stream, _)) = listener.accept() {
            std::thread::sleep(hold);
            drop(stream);
        }
    });

    format!("http://{}/oui.txt", addr)
}

/// A loopback URL with nothing listening behind it.
pub fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read listener address");
    drop(listener);
    format!("http://{}/oui.txt", addr)
}

mod tests {
    use super::*;
    use crate::oui::parser::parse_registry;

    #[test]
    fn test_sample_registry_shape() {
        let text = sample_registry(3);
        assert!(text.contains("OUI/MA-L"));
        assert!(text.contains("Organization"));
        assert!(text.contains("00-00-03   (hex)\t\tVendor 3 Corporation"));
    }

    #[test]
    fn test_known_vendors_parse() {
        let records = parse_registry(&known_vendors_registry());
        assert_eq!(records.len(), 4);
        assert_eq!(records[3].prefix, "08-00-27");
    }
}
