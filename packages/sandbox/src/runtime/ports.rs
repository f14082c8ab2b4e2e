// ABOUTME: Detects the listening port from common dev server startup lines
// ABOUTME: Handles Vite, Next.js and Express banners plus generic localhost URLs

use once_cell::sync::Lazy;
use regex::Regex;

static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("ansi pattern is valid"));

// Most specific first.
static PORT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"Local:\s+https?://(?:localhost|127\.0\.0\.1|\[::1\]):(\d+)", // Vite: "Local:   http://localhost:5173/"
        r"ready - started server on.*:(\d+)", // Next.js: "ready - started server on 0.0.0.0:3000"
        r"Server ready at https?://localhost:(\d+)",
        r"Running at https?://localhost:(\d+)",
        r"(?i)server running on port (\d+)", // Express: "Server running on port 8476"
        r"https?://localhost:(\d+)",
        r"localhost:(\d+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("port pattern is valid"))
    .collect()
});

/// Port announced by `line`, if any. Color escapes are ignored.
pub fn extract_port(line: &str) -> Option<u16> {
    let line = ANSI_ESCAPE.replace_all(line, "");
    PORT_PATTERNS.iter().find_map(|regex| {
        regex
            .captures(&line)
            .and_then(|captures| captures.get(1))
            .and_then(|port| port.as_str().parse::<u16>().ok())
            .filter(|port| *port != 0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("  ➜  Local:   http://localhost:5173/", Some(5173))]
    #[case("  \x1b[32m➜\x1b[39m  Local:   http://localhost:\x1b[1m5174\x1b[22m/", Some(5174))]
    #[case("ready - started server on 0.0.0.0:3000, url: http://localhost:3000", Some(3000))]
    #[case("Express server running on port 8476", Some(8476))]
    #[case("  - Local:        http://localhost:3001", Some(3001))]
    #[case("Listening on localhost:8080", Some(8080))]
    #[case("added 120 packages in 3s", None)]
    #[case("http://localhost:99999", None)]
    fn test_extract_port(#[case] line: &str, #[case] expected: Option<u16>) {
        assert_eq!(extract_port(line), expected);
    }
}
