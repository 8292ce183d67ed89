//! Deterministic signal extraction: a pure function over the collected
//! artifacts. No I/O, no clock reads beyond the expiry comparison input.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::schema::{HttpArtifact, Signal, TlsArtifact};

static NONPROD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(dev|staging|stage|test|qa|uat|preprod|nonprod|internal|local)\b").unwrap()
});

static VERSION_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+\.\d+(\.\d+)?").unwrap());

static WAF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(cloudflare|cf-ray|akamai|incapsula|imperva|sucuri|big-?ip|mod_?security|barracuda|wordfence|fortiweb|wallarm|ray id|incident id|reference #|attention required)",
    )
    .unwrap()
});

static API_UI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(swagger-ui|redoc|graphiql)").unwrap());

/// Paths whose 401/403 suggests intentionally protected API documentation.
const DOCS_PATHS: &[&str] = &[
    "/swagger",
    "/swagger.json",
    "/swagger.yaml",
    "/swagger/index.html",
    "/api-docs",
    "/openapi.json",
    "/openapi.yaml",
    "/docs",
    "/redoc",
    "/graphql",
];

const VERBOSE_HEADERS: &[&str] = &["server", "x-powered-by", "x-aspnet-version"];
const WAF_STATUSES: [u16; 4] = [403, 406, 429, 503];
const SLOW_BASELINE_MS: u64 = 500;

fn baseline_of(http: &[HttpArtifact]) -> Option<&HttpArtifact> {
    http.iter()
        .find(|a| a.tags.iter().any(|t| t == "baseline"))
        .or_else(|| http.first())
}

fn tls_subject_mismatch(tls: &TlsArtifact) -> bool {
    let mut names = tls.san.iter().map(String::as_str).collect::<Vec<_>>();
    if let Some(cn) = tls.cn.as_deref() {
        names.push(cn);
    }
    names.iter().any(|name| NONPROD_RE.is_match(name))
}

fn tls_internal_issuer(tls: &TlsArtifact) -> bool {
    if tls.self_signed {
        return true;
    }
    tls.issuer_dn
        .as_deref()
        .map(|dn| {
            let dn = dn.to_ascii_lowercase();
            dn.contains("enterprise") || dn.contains("internal")
        })
        .unwrap_or(false)
}

fn tls_expired(tls: &TlsArtifact, now: DateTime<Utc>) -> bool {
    if let Some(err) = tls.error.as_deref() {
        if err.to_ascii_lowercase().contains("expired") {
            return true;
        }
    }
    tls.not_after
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|not_after| not_after.with_timezone(&Utc) < now)
        .unwrap_or(false)
}

fn verbose_headers(artifact: &HttpArtifact) -> bool {
    VERBOSE_HEADERS.iter().any(|name| {
        artifact
            .header(name)
            .map(|v| VERSION_TOKEN_RE.is_match(v))
            .unwrap_or(false)
    })
}

fn waf_suspected(artifact: &HttpArtifact) -> bool {
    let status_blocked = artifact
        .status_code
        .map(|s| WAF_STATUSES.contains(&s))
        .unwrap_or(false);
    if !status_blocked {
        return false;
    }
    let header_blob = artifact
        .headers
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join("\n");
    WAF_RE.is_match(&header_blob) || WAF_RE.is_match(artifact.snippet())
}

fn api_spec_exposed(artifact: &HttpArtifact) -> bool {
    if artifact.status_code != Some(200) {
        return false;
    }
    let content_type = artifact.header("content-type").unwrap_or("").to_ascii_lowercase();
    if !(content_type.contains("json") || content_type.contains("yaml") || content_type.contains("text")) {
        return false;
    }
    let body = artifact.snippet().to_ascii_lowercase();
    let marker = body.contains("openapi") || body.contains("swagger");
    let structural = body.contains("paths") && (body.contains("info") || body.contains("components"));
    marker && structural
}

fn is_docs_path(artifact: &HttpArtifact) -> bool {
    let path = artifact.path();
    DOCS_PATHS.iter().any(|d| path.ends_with(d))
}

/// Extract the full signal set in a fixed order. Same artifacts in, same
/// signal list out, byte for byte.
pub fn extract_signals(tls: Option<&TlsArtifact>, http: &[HttpArtifact]) -> Vec<Signal> {
    extract_signals_at(tls, http, Utc::now())
}

/// Clock-injected variant so expiry checks stay testable.
pub fn extract_signals_at(
    tls: Option<&TlsArtifact>,
    http: &[HttpArtifact],
    now: DateTime<Utc>,
) -> Vec<Signal> {
    let mut signals = Vec::new();

    if let Some(tls) = tls {
        signals.push(
            Signal::new("tls.subject_mismatch", "tls", &tls.target_id, tls_subject_mismatch(tls))
                .confidence(0.9)
                .weight(2)
                .artifact(&tls.tls_id),
        );
        signals.push(
            Signal::new("tls.issuer_type", "tls", &tls.target_id, tls_internal_issuer(tls))
                .confidence(0.7)
                .artifact(&tls.tls_id),
        );
        signals.push(
            Signal::new("tls.is_expired", "tls", &tls.target_id, tls_expired(tls, now))
                .confidence(0.95)
                .weight(2)
                .artifact(&tls.tls_id),
        );
    }

    let Some(baseline) = baseline_of(http) else {
        return signals;
    };
    let target_id = baseline.target_id.clone();

    signals.push(
        Signal::new("http.header.verbose", "http", &target_id, verbose_headers(baseline))
            .confidence(0.8)
            .artifact(&baseline.request_id),
    );
    signals.push(
        Signal::new(
            "http.response.latency",
            "http",
            &target_id,
            baseline.timings_ms.total > SLOW_BASELINE_MS,
        )
        .confidence(0.5)
        .artifact(&baseline.request_id),
    );
    signals.push(
        Signal::new("http.blocked.waf_suspected", "http", &target_id, waf_suspected(baseline))
            .confidence(0.7)
            .artifact(&baseline.request_id),
    );

    let spec_hit = http.iter().find(|a| api_spec_exposed(a));
    let ui_hit = http
        .iter()
        .find(|a| a.status_code == Some(200) && API_UI_RE.is_match(a.snippet()));
    let docs_blocked = http.iter().find(|a| {
        is_docs_path(a) && matches!(a.status_code, Some(401) | Some(403))
    });

    let mut spec_signal = Signal::new("surface.api.spec_exposed", "http", &target_id, spec_hit.is_some())
        .confidence(0.9)
        .weight(2);
    if let Some(a) = spec_hit {
        spec_signal = spec_signal.artifact(&a.request_id);
    }
    signals.push(spec_signal);

    let mut ui_signal = Signal::new("surface.api.ui_exposed", "http", &target_id, ui_hit.is_some())
        .confidence(0.85)
        .weight(2);
    if let Some(a) = ui_hit {
        ui_signal = ui_signal.artifact(&a.request_id);
    }
    signals.push(ui_signal);

    let docs_protected = docs_blocked.is_some() && spec_hit.is_none() && ui_hit.is_none();
    let mut docs_signal =
        Signal::new("surface.api.docs_protected", "http", &target_id, docs_protected).confidence(0.6);
    if docs_protected {
        if let Some(a) = docs_blocked {
            docs_signal = docs_signal.artifact(&a.request_id);
        }
    }
    signals.push(docs_signal);

    signals
}
