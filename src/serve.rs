//! Web server for the significance dashboard
//!
//! Serves an upload page and a JSON analysis endpoint. Requests are handled
//! one at a time; each one works on its own copy of the configuration.

use crate::config::Config;
use crate::decoders::percent_decode;
use crate::error::{AnalysisError, ErrorKind};
use crate::pipeline::{analyze_upload, AnalysisOutcome};
use crate::svg;
use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Read;
use tiny_http::{Header, Response, Server};

/// Response produced by [`route`], independent of the transport
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Reply {
    fn html(body: String) -> Self {
        Reply {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body,
        }
    }

    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        Reply {
            status,
            content_type: "application/json",
            body: serde_json::to_string(value).unwrap_or_else(|e| format!("{{\"status\":\"error\",\"message\":\"{}\"}}", e)),
        }
    }

    fn text(status: u16, body: &str) -> Self {
        Reply {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.to_string(),
        }
    }
}

/// Body of `POST /api/analyze`
#[derive(Debug, Serialize)]
struct AnalyzeResponse {
    #[serde(flatten)]
    outcome: AnalysisOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    svg: Option<String>,
}

/// Start the dashboard server
pub fn start_server(config: &Config, open: bool) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let server = Server::http(&addr).map_err(|e| anyhow::anyhow!("Failed to start server: {}", e))?;

    let url = format!("http://localhost:{}", config.server.port);
    log::info!("Server running at {}", url);
    log::info!("Press Ctrl+C to stop");

    if open {
        if let Err(e) = webbrowser::open(&url) {
            log::warn!("Could not open browser: {}. Please open {} manually.", e, url);
        }
    }

    let limit = config.server.max_upload_bytes;

    for mut request in server.incoming_requests() {
        let url = request.url().to_string();
        let method = request.method().as_str().to_string();
        log::debug!("{} {}", method, url);

        let reply = if method == "POST" {
            match read_body(&mut request, limit) {
                Ok(body) => route(config, &method, &url, &body),
                Err(reply) => reply,
            }
        } else {
            route(config, &method, &url, &[])
        };

        if reply.status >= 400 {
            log::warn!("{} {} -> {}", method, url, reply.status);
        }

        let response = Response::from_string(reply.body)
            .with_status_code(reply.status)
            .with_header(Header::from_bytes("Content-Type", reply.content_type).unwrap());

        if let Err(e) = request.respond(response) {
            log::error!("Failed to send response: {}", e);
        }
    }

    Ok(())
}

fn read_body(request: &mut tiny_http::Request, limit: usize) -> std::result::Result<Vec<u8>, Reply> {
    let declared = request.body_length();
    read_limited(request.as_reader(), declared, limit)
}

/// Read at most `limit` bytes; anything longer, declared or actual, is a 413
fn read_limited<R: Read>(reader: R, declared: Option<usize>, limit: usize) -> std::result::Result<Vec<u8>, Reply> {
    if declared.is_some_and(|len| len > limit) {
        return Err(too_large(limit));
    }

    let mut body = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut body)
        .map_err(|e| Reply::text(400, &format!("Failed to read request body: {}", e)))?;

    if body.len() > limit {
        return Err(too_large(limit));
    }
    Ok(body)
}

fn too_large(limit: usize) -> Reply {
    Reply::json(
        413,
        &AnalysisOutcome::Error {
            kind: ErrorKind::Validation,
            message: format!("Upload exceeds {} bytes", limit),
        },
    )
}

/// Dispatch one request
pub fn route(config: &Config, method: &str, url: &str, body: &[u8]) -> Reply {
    let path = url.split('?').next().unwrap_or("");

    match (method, path) {
        ("GET", "/") | ("GET", "/index.html") => Reply::html(generate_upload_html(config)),
        ("GET", "/health") => Reply::json(200, &serde_json::json!({ "status": "ok" })),
        ("GET", "/api/config") => Reply::json(200, config),
        ("POST", "/api/analyze") => analyze(config, url, body),
        _ => Reply::text(404, "Not found"),
    }
}

fn analyze(config: &Config, url: &str, body: &[u8]) -> Reply {
    let params = parse_query_params(url);
    let request_config = match config.with_overrides(&params) {
        Ok(c) => c,
        Err(e) => {
            let error = AnalysisError::Validation(format!("{:#}", e));
            return Reply::json(status_for(error.kind()), &AnalysisOutcome::from_error(&error));
        }
    };

    match analyze_upload(body, &request_config) {
        Ok(report) => {
            log::info!(
                "Analysed upload: {} cells, {} comparisons ({} significant)",
                report.summary.len(),
                report.comparisons.len(),
                report.significant_count()
            );
            let svg = svg::render(&report.chart);
            let outcome = AnalysisOutcome::from_result(Ok(report));
            Reply::json(200, &AnalyzeResponse { outcome, svg: Some(svg) })
        }
        Err(e) => {
            log::warn!("Analysis failed: {}", e);
            let outcome = AnalysisOutcome::from_error(&e);
            Reply::json(status_for(e.kind()), &AnalyzeResponse { outcome, svg: None })
        }
    }
}

/// HTTP status for an analysis failure
pub fn status_for(kind: ErrorKind) -> u16 {
    match kind {
        ErrorKind::Parse => 400,
        ErrorKind::Validation | ErrorKind::InsufficientData | ErrorKind::Computation => 422,
    }
}

/// Parse query parameters from URL path
fn parse_query_params(path: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(query) = path.split_once('?').map(|(_, q)| q) {
        for pair in query.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                params.insert(url_decode(key), url_decode(value));
            }
        }
    }
    params
}

/// Form-style decoding: `+` is a space, then `%XX` escapes. Malformed
/// escapes are kept verbatim.
fn url_decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode(&spaced).unwrap_or(spaced)
}

fn generate_upload_html(config: &Config) -> String {
    let defaults = serde_json::json!({
        "analysis": config.analysis,
        "columns": config.columns,
        "chart": config.chart.kind,
    })
    .to_string()
    .replace('<', "\\u003c");

    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>sigdash</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background: #f8f9fa; color: #212529; padding: 20px; }}
        .container {{ max-width: 1200px; margin: 0 auto; }}
        h1 {{ color: #2c3e50; }}
        .controls {{ display: flex; flex-wrap: wrap; gap: 12px; align-items: center; background: #fff; padding: 16px; border-radius: 8px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }}
        .drop {{ border: 2px dashed #adb5bd; border-radius: 8px; padding: 24px; text-align: center; margin: 16px 0; cursor: pointer; background: #fff; }}
        .error {{ background: #f8d7da; color: #721c24; padding: 12px 16px; border-radius: 8px; margin: 16px 0; display: none; }}
        #chart {{ background: #fff; border-radius: 8px; padding: 16px; margin: 16px 0; overflow-x: auto; }}
        table {{ width: 100%; border-collapse: collapse; background: #fff; margin-bottom: 24px; }}
        th, td {{ padding: 6px 10px; border-bottom: 1px solid #dee2e6; text-align: left; font-size: 0.9rem; }}
        th {{ background: #f1f3f4; }}
        tr.sig td {{ font-weight: bold; }}
    </style>
</head>
<body>
<div class="container">
    <h1>{}</h1>
    <div class="controls">
        <label>Method
            <select id="method">
                <option value="pairwise-t">Pairwise t-test</option>
                <option value="anova-tukey">ANOVA + Tukey HSD</option>
            </select>
        </label>
        <label>Correction
            <select id="correction">
                <option value="bonferroni">Bonferroni</option>
                <option value="holm">Holm</option>
                <option value="none">None</option>
            </select>
        </label>
        <label>Alpha <input id="alpha" type="number" step="0.01" min="0.001" max="0.5"></label>
        <label><input id="welch" type="checkbox"> Welch</label>
        <label>Chart
            <select id="chart-kind">
                <option value="bar">Bar</option>
                <option value="box">Box</option>
            </select>
        </label>
    </div>
    <div class="controls">
        <label>Group column <select id="group-column"></select></label>
        <label>Subgroup column <select id="subgroup-column"></select></label>
        <label>Value column <select id="value-column"></select></label>
    </div>
    <div class="drop" id="drop">Drag and Drop or <u>Select a CSV file</u>
        <input id="file" type="file" accept=".csv,text/csv" style="display:none">
    </div>
    <div class="error" id="error"></div>
    <div id="chart"></div>
    <div id="summary"></div>
    <div id="comparisons"></div>
</div>
<script>
const defaults = {};
document.getElementById('method').value = defaults.analysis.method;
document.getElementById('correction').value = defaults.analysis.correction;
document.getElementById('alpha').value = defaults.analysis.alpha;
document.getElementById('welch').checked = !defaults.analysis.equal_variance;
document.getElementById('chart-kind').value = defaults.chart;
setColumns([defaults.columns.group, defaults.columns.subgroup, defaults.columns.value].filter(c => c));

let lastUpload = null;
const drop = document.getElementById('drop');
const input = document.getElementById('file');
drop.addEventListener('click', () => input.click());
drop.addEventListener('dragover', e => e.preventDefault());
drop.addEventListener('drop', e => {{ e.preventDefault(); readFile(e.dataTransfer.files[0]); }});
input.addEventListener('change', () => readFile(input.files[0]));
for (const id of ['method', 'correction', 'alpha', 'welch', 'chart-kind', 'group-column', 'subgroup-column', 'value-column']) {{
    document.getElementById(id).addEventListener('change', () => {{ if (lastUpload) analyze(lastUpload); }});
}}

// Column selectors list the uploaded header; subgroup may be "(none)"
function setColumns(header) {{
    fill('group-column', header, defaults.columns.group, false);
    fill('subgroup-column', header, defaults.columns.subgroup, true);
    fill('value-column', header, defaults.columns.value, false);
}}

function fill(id, header, preferred, optional) {{
    const select = document.getElementById(id);
    select.innerHTML = '';
    if (optional) select.add(new Option('(none)', ''));
    for (const name of header) select.add(new Option(name, name));
    select.value = header.includes(preferred) ? preferred : (optional ? '' : (header[0] || ''));
}}

function parseHeader(text) {{
    const line = text.replace(/^\uFEFF/, '').split(/\r?\n/)[0] || '';
    return line.split(defaults.columns.delimiter).map(c => c.trim().replace(/^"(.*)"$/, '$1')).filter(c => c);
}}

async function readFile(file) {{
    if (!file) return;
    setColumns(parseHeader(await file.slice(0, 65536).text()));
    const reader = new FileReader();
    reader.onload = () => {{ lastUpload = reader.result; analyze(lastUpload); }};
    reader.readAsDataURL(file);
}}

async function analyze(dataUri) {{
    const params = new URLSearchParams({{
        method: document.getElementById('method').value,
        correction: document.getElementById('correction').value,
        alpha: document.getElementById('alpha').value,
        welch: document.getElementById('welch').checked ? 'true' : 'false',
        chart: document.getElementById('chart-kind').value,
        group: document.getElementById('group-column').value,
        subgroup: document.getElementById('subgroup-column').value,
        value: document.getElementById('value-column').value,
    }});
    const res = await fetch('/api/analyze?' + params, {{ method: 'POST', body: dataUri }});
    const data = await res.json();
    const error = document.getElementById('error');
    if (data.status !== 'ok') {{
        error.textContent = data.kind + ': ' + data.message;
        error.style.display = 'block';
        return;
    }}
    error.style.display = 'none';
    document.getElementById('chart').innerHTML = data.svg;
    document.getElementById('summary').innerHTML = '<h2>Summary</h2>' + table(data.report.summary_columns, data.report.summary);
    document.getElementById('comparisons').innerHTML = '<h2>Comparisons</h2>' + table(data.report.comparison_columns, data.report.comparisons);
}}

function escapeHtml(s) {{
    return String(s).replace(/[&<>"']/g, c => ({{'&':'&amp;','<':'&lt;','>':'&gt;','"':'&quot;',"'":'&#39;'}})[c]);
}}

function cell(v) {{
    if (v === null || v === undefined) return '-';
    if (typeof v === 'number' && !Number.isInteger(v)) return v.toFixed(4);
    return escapeHtml(v);
}}

function table(columns, rows) {{
    const head = columns.map(c => '<th>' + escapeHtml(c.name) + '</th>').join('');
    const body = rows.map(r => '<tr' + (r.significant ? ' class="sig"' : '') + '>' +
        columns.map(c => '<td>' + cell(r[c.id]) + '</td>').join('') + '</tr>').join('');
    return '<table><tr>' + head + '</tr>' + body + '</table>';
}}
</script>
</body>
</html>
"##,
        svg::escape(&config.chart.title),
        defaults
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "group,subgroup,value\ng1,s1,10\ng1,s1,12\ng1,s2,30\ng1,s2,32\n";

    fn body(reply: &Reply) -> serde_json::Value {
        serde_json::from_str(&reply.body).unwrap()
    }

    #[test]
    fn test_parse_query_params() {
        let params = parse_query_params("/api/analyze?method=anova-tukey&alpha=0.01&group=my+group");
        assert_eq!(params.get("method").map(String::as_str), Some("anova-tukey"));
        assert_eq!(params.get("alpha").map(String::as_str), Some("0.01"));
        assert_eq!(params.get("group").map(String::as_str), Some("my group"));
        assert!(parse_query_params("/api/analyze").is_empty());
    }

    #[test]
    fn test_query_params_are_percent_decoded() {
        let params = parse_query_params("/api/analyze?group=Zeit+%28h%29&sub%67roup=&value=M%C3%A4nge");
        assert_eq!(params.get("group").map(String::as_str), Some("Zeit (h)"));
        assert_eq!(params.get("subgroup").map(String::as_str), Some(""));
        assert_eq!(params.get("value").map(String::as_str), Some("Mänge"));

        // malformed escapes pass through
        let params = parse_query_params("/?group=100%");
        assert_eq!(params.get("group").map(String::as_str), Some("100%"));
    }

    #[test]
    fn test_encoded_column_override() {
        let csv = "Zeit (h),value\nA,20\nA,22\nB,30\nB,33\n";
        let reply = route(
            &Config::default(),
            "POST",
            "/api/analyze?subgroup=&group=Zeit+%28h%29",
            csv.as_bytes(),
        );
        assert_eq!(reply.status, 200);
        assert_eq!(body(&reply)["report"]["dataset"]["columns"]["group"], "Zeit (h)");
    }

    #[test]
    fn test_read_limited() {
        let bytes = read_limited(&b"group,value"[..], None, 64).unwrap();
        assert_eq!(bytes, b"group,value");

        let reply = read_limited(&[b'x'; 65][..], None, 64).unwrap_err();
        assert_eq!(reply.status, 413);
        assert_eq!(body(&reply)["status"], "error");

        // a declared length over the limit is refused before reading
        let reply = read_limited(&b""[..], Some(65), 64).unwrap_err();
        assert_eq!(reply.status, 413);

        assert!(read_limited(&[b'x'; 64][..], Some(64), 64).is_ok());
    }

    #[test]
    fn test_upload_page_controls() {
        let mut config = Config::default();
        config.chart.kind = crate::config::ChartKind::Box;
        let page = route(&config, "GET", "/", &[]).body;

        for id in ["group-column", "subgroup-column", "value-column", "chart-kind"] {
            assert!(page.contains(&format!("id=\"{}\"", id)), "missing control {}", id);
        }
        assert!(page.contains("document.getElementById('chart-kind').value = defaults.chart;"));
        assert!(page.contains("\"chart\":\"box\""));
        assert!(page.contains("subgroup: document.getElementById('subgroup-column').value"));
    }

    #[test]
    fn test_single_factor_upload_with_column_params() {
        let csv = "group,value\nA,20\nA,22\nA,24\nB,30\nB,32\nB,34\n";
        let reply = route(
            &Config::default(),
            "POST",
            "/api/analyze?group=group&subgroup=&value=value&method=anova-tukey",
            csv.as_bytes(),
        );
        assert_eq!(reply.status, 200);
        assert_eq!(body(&reply)["report"]["dataset"]["has_subgroup"], false);
    }

    #[test]
    fn test_status_for() {
        assert_eq!(status_for(ErrorKind::Parse), 400);
        assert_eq!(status_for(ErrorKind::Validation), 422);
        assert_eq!(status_for(ErrorKind::InsufficientData), 422);
        assert_eq!(status_for(ErrorKind::Computation), 422);
    }

    #[test]
    fn test_analyze_ok() {
        let reply = route(&Config::default(), "POST", "/api/analyze", CSV.as_bytes());
        assert_eq!(reply.status, 200);
        assert_eq!(reply.content_type, "application/json");
        let value = body(&reply);
        assert_eq!(value["status"], "ok");
        assert_eq!(value["report"]["comparisons"][0]["significance"], "a");
        assert!(value["svg"].as_str().unwrap().starts_with("<svg"));
    }

    #[test]
    fn test_analyze_data_uri() {
        use base64::Engine as _;
        let uri = format!(
            "data:text/csv;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(CSV)
        );
        let reply = route(&Config::default(), "POST", "/api/analyze", uri.as_bytes());
        assert_eq!(reply.status, 200);
    }

    #[test]
    fn test_analyze_errors() {
        let config = Config::default();

        let reply = route(&config, "POST", "/api/analyze", b"group,subgroup\ng1,s1\n");
        assert_eq!(reply.status, 422);
        let value = body(&reply);
        assert_eq!(value["status"], "error");
        assert_eq!(value["kind"], "validation");
        assert!(value.get("svg").is_none());

        let reply = route(&config, "POST", "/api/analyze", b"group,subgroup,value\ng1,s1,abc\n");
        assert_eq!(reply.status, 400);
        assert_eq!(body(&reply)["kind"], "parse");

        let reply = route(&config, "POST", "/api/analyze?alpha=2", CSV.as_bytes());
        assert_eq!(reply.status, 422);
    }

    #[test]
    fn test_query_overrides_are_per_request() {
        let config = Config::default();
        let csv = "group,value\nA,20\nA,22\nA,24\nB,30\nB,32\nB,34\n";

        let reply = route(&config, "POST", "/api/analyze?subgroup=&method=anova-tukey", csv.as_bytes());
        assert_eq!(reply.status, 200);
        assert_eq!(body(&reply)["report"]["options"]["method"], "anova-tukey");

        // the shared configuration is untouched
        let reply = route(&config, "POST", "/api/analyze", csv.as_bytes());
        assert_eq!(reply.status, 422);
    }

    #[test]
    fn test_static_routes() {
        let config = Config::default();
        let page = route(&config, "GET", "/", &[]);
        assert_eq!(page.status, 200);
        assert!(page.body.contains("readAsDataURL"));

        let health = route(&config, "GET", "/health", &[]);
        assert_eq!(body(&health)["status"], "ok");

        let cfg = route(&config, "GET", "/api/config", &[]);
        assert_eq!(body(&cfg)["analysis"]["alpha"], 0.05);

        assert_eq!(route(&config, "GET", "/missing", &[]).status, 404);
        assert_eq!(route(&config, "GET", "/api/analyze", &[]).status, 404);
    }
}
