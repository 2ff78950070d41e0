/// Origin allow-list applied before the WebSocket upgrade.
///
/// Patterns are matched case-insensitively against the `Origin` header's
/// host (including the port when one is present) with `*` and `?`
/// wildcards. An empty list disables the check entirely; requests without
/// an `Origin` header (non-browser clients) always pass.
#[derive(Debug, Clone, Default)]
pub struct OriginAllowList {
    patterns: Vec<String>,
}

impl OriginAllowList {
    pub fn new(patterns: Vec<String>) -> Self {
        let patterns = patterns
            .into_iter()
            .map(|p| p.trim().to_ascii_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { patterns }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn allows(&self, origin: Option<&str>) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        let Some(origin) = origin else {
            return true;
        };
        let Some(host) = origin_host(origin) else {
            return false;
        };
        self.patterns.iter().any(|p| glob_match(p, &host))
    }
}

fn origin_host(origin: &str) -> Option<String> {
    let url = url::Url::parse(origin).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    })
}

/// Wildcard match: `*` spans any run of characters, `?` exactly one.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
