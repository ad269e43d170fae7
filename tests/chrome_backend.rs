//! Headless Chrome end to end. Requires a local Chrome/Chromium:
//! `cargo test --test chrome_backend -- --ignored`

#![cfg(feature = "cdp")]

use fragment_harvest::cdp::CdpBackend;
use fragment_harvest::{pipeline, Backend, HarvestConfig, OutputLayout, PageHandle, Region, Timing, Viewport};
use std::time::Duration;
use tiny_http::{Header, Response, Server};

// The footer only exists after a script runs.
const PAGE: &str = r#"<!DOCTYPE html>
<html><head><style>.brand { color: #123456 } .late { color: red }</style></head>
<body>
<header><a class="brand" href="/">Brand</a><i class="fa fa-times"></i></header>
<script>
  setTimeout(function () {
    var f = document.createElement('footer');
    f.className = 'late';
    f.textContent = 'rendered by script';
    document.body.appendChild(f);
  }, 50);
</script>
</body></html>"#;

fn serve_page() -> String {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr();
    std::thread::spawn(move || {
        for request in server.incoming_requests() {
            let html: Header = "Content-Type: text/html; charset=utf-8".parse().unwrap();
            let _ = request.respond(Response::from_string(PAGE).with_header(html));
        }
    });
    format!("http://{}", addr)
}

#[test]
#[ignore = "requires Chrome"]
fn test_viewport_sets_layout_width() {
    let url = serve_page();
    let config = HarvestConfig { sandbox: false, ..Default::default() };
    let mut backend = CdpBackend::launch(&config).unwrap();
    let mut page = backend.new_page().unwrap();

    for viewport in [Viewport::mobile(), Viewport::desktop()] {
        page.set_viewport(&viewport).unwrap();
        page.navigate(&url, Duration::from_secs(10)).unwrap();
        let width = page.evaluate("window.innerWidth").unwrap();
        assert_eq!(width.as_f64(), Some(viewport.width as f64), "{}", viewport.label);
    }

    page.close().unwrap();
    backend.close().unwrap();
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_chrome_renders_dynamic_footer() {
    let url = serve_page();

    let out = tempfile::tempdir().unwrap();
    let config = HarvestConfig {
        base_url: url,
        sandbox: false,
        timing: Timing {
            settle_delay: Duration::from_millis(300),
            collect_settle_delay: Duration::from_millis(300),
            ..Default::default()
        },
        output: OutputLayout {
            components_dir: out.path().join("external"),
            stylesheet_path: out.path().join("auto-generated.css"),
        },
        ..Default::default()
    };

    let report = pipeline::run::<CdpBackend>(&config).await;
    assert_eq!(report.exit_code(), 0, "fatal: {:?}", report.fatal);
    assert_eq!(report.live_count(), 2);
    assert_eq!(report.icons_substituted, vec!["FaTimes"]);

    let footer = std::fs::read_to_string(config.output.unit_path(Region::Footer)).unwrap();
    assert!(footer.contains("rendered by script"));

    let css = std::fs::read_to_string(&config.output.stylesheet_path).unwrap();
    assert!(css.contains(".external-header-container .brand {"));
    assert!(css.contains(".external-footer-container .late {"));
}
