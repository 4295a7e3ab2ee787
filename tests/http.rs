//! HTTP surface tests: the real router on an ephemeral port, driven by ureq

use std::io::Read;
use std::sync::Arc;

use emx_docgen::server::{router, CONTENT_DISPOSITION, DOCX_CONTENT_TYPE, LIVENESS_TEXT};
use emx_docgen::{Archive, Decoder, Encoder, Entry, ServerConfig, MAIN_DOCUMENT_PART};

const BOUNDARY: &str = "emx-docgen-test-boundary";

fn template(text: &str) -> Vec<u8> {
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>{text}</w:t></w:r></w:p></w:body></w:document>"#
    );
    let mut archive = Archive::new();
    archive.add_entry(Entry::new("[Content_Types].xml", "<Types/>")).unwrap();
    archive.add_entry(Entry::new(MAIN_DOCUMENT_PART, document)).unwrap();
    Encoder::new().encode(&archive).unwrap()
}

enum Part<'a> {
    File { name: &'a str, filename: &'a str, data: &'a [u8] },
    Text { name: &'a str, value: &'a str },
}

fn multipart(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File { name, filename, data } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; \
                         filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::Text { name, value } => {
                let disposition =
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n");
                body.extend_from_slice(disposition.as_bytes());
                body.extend_from_slice(value.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Reply {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn finish(result: Result<ureq::Response, ureq::Error>) -> Reply {
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(e) => panic!("transport error: {e}"),
    };
    let status = response.status();
    let headers = response
        .headers_names()
        .into_iter()
        .filter_map(|name| response.header(&name).map(|value| (name.clone(), value.to_string())))
        .collect();
    let mut body = Vec::new();
    response.into_reader().read_to_end(&mut body).unwrap();
    Reply { status, headers, body }
}

async fn start(config: ServerConfig) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(Arc::new(config));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn get(base: &str, path: &str) -> Reply {
    let url = format!("{base}{path}");
    tokio::task::spawn_blocking(move || finish(ureq::get(&url).call()))
        .await
        .unwrap()
}

async fn post(base: &str, path: &str, parts: &[Part<'_>]) -> Reply {
    let url = format!("{base}{path}");
    let body = multipart(parts);
    tokio::task::spawn_blocking(move || {
        finish(
            ureq::post(&url)
                .set("Content-Type", &format!("multipart/form-data; boundary={BOUNDARY}"))
                .send_bytes(&body),
        )
    })
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_health() {
    let base = start(ServerConfig::default()).await;
    let reply = get(&base, "/health").await;

    assert_eq!(reply.status, 200);
    let body: serde_json::Value = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(body, serde_json::json!({"ok": true}));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_root_and_fallback() {
    let base = start(ServerConfig::default()).await;

    let root = get(&base, "/").await;
    assert_eq!(root.status, 200);
    assert_eq!(root.text(), LIVENESS_TEXT);

    let missing = get(&base, "/nope").await;
    assert_eq!(missing.status, 404);
    assert_eq!(missing.text(), "Not found");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_generate_success() {
    let base = start(ServerConfig::default()).await;
    let docx = template("Hello [[name]]! [[ok_checkbox]]");

    for path in ["/generate/docx", "/generate/docx/"] {
        let reply = post(
            &base,
            path,
            &[
                Part::File { name: "template", filename: "t.docx", data: &docx },
                Part::Text { name: "data", value: r#"{"name": "World", "ok": true}"# },
            ],
        )
        .await;

        assert_eq!(reply.status, 200, "{}", reply.text());
        assert_eq!(reply.header("content-type"), Some(DOCX_CONTENT_TYPE));
        assert_eq!(reply.header("content-disposition"), Some(CONTENT_DISPOSITION));
        assert_eq!(reply.header("content-length"), Some(reply.body.len().to_string().as_str()));
        assert_eq!(reply.header("cache-control"), Some("no-transform"));
        assert_eq!(reply.header("x-content-type-options"), Some("nosniff"));

        let archive = Decoder::new().decode(&reply.body).unwrap();
        let bytes = archive.read_entry(MAIN_DOCUMENT_PART).unwrap();
        let document = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(document.contains("Hello World! ☒"));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_template() {
    let base = start(ServerConfig::default()).await;
    let reply = post(&base, "/generate/docx", &[Part::Text { name: "data", value: "{}" }]).await;

    assert_eq!(reply.status, 400);
    assert!(reply.text().contains("'template'"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_template_as_text_field_is_missing() {
    let base = start(ServerConfig::default()).await;
    let reply = post(
        &base,
        "/generate/docx",
        &[
            Part::Text { name: "template", value: "not a file" },
            Part::Text { name: "data", value: "{}" },
        ],
    )
    .await;

    assert_eq!(reply.status, 400);
    assert!(reply.text().contains("'template'"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_data() {
    let base = start(ServerConfig::default()).await;
    let docx = template("[[x]]");
    let reply = post(
        &base,
        "/generate/docx",
        &[Part::File { name: "template", filename: "t.docx", data: &docx }],
    )
    .await;

    assert_eq!(reply.status, 400);
    assert!(reply.text().contains("'data'"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bad_json_rejected_before_archive_is_opened() {
    let base = start(ServerConfig::default()).await;
    // Not a zip either: a 400 proves the payload was checked first.
    for value in ["not-json", "[1, 2]"] {
        let reply = post(
            &base,
            "/generate/docx",
            &[
                Part::File { name: "template", filename: "t.docx", data: b"garbage" },
                Part::Text { name: "data", value },
            ],
        )
        .await;

        assert_eq!(reply.status, 400);
        assert!(reply.text().contains("not valid JSON"));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unterminated_token_is_server_error() {
    let base = start(ServerConfig::default()).await;
    let docx = template("Hello [[name");
    let reply = post(
        &base,
        "/generate/docx",
        &[
            Part::File { name: "template", filename: "t.docx", data: &docx },
            Part::Text { name: "data", value: r#"{"name": "x"}"# },
        ],
    )
    .await;

    assert_eq!(reply.status, 500);
    assert!(reply.text().starts_with("error while generating the document: render failed"));
    assert_ne!(reply.header("content-type"), Some(DOCX_CONTENT_TYPE));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_corrupt_template_is_server_error() {
    let base = start(ServerConfig::default()).await;
    let reply = post(
        &base,
        "/generate/docx",
        &[
            Part::File { name: "template", filename: "t.docx", data: b"garbage" },
            Part::Text { name: "data", value: "{}" },
        ],
    )
    .await;

    assert_eq!(reply.status, 500);
    assert!(reply.text().contains("corrupt archive"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_template_over_upload_limit() {
    let docx = template("[[x]]");
    let base = start(ServerConfig::default().with_upload_limit(docx.len() - 1)).await;
    let reply = post(
        &base,
        "/generate/docx",
        &[
            Part::File { name: "template", filename: "t.docx", data: &docx },
            Part::Text { name: "data", value: "{}" },
        ],
    )
    .await;

    assert_eq!(reply.status, 413);
}
