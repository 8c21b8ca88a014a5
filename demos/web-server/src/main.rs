//! Shell bridge web server with an xterm.js page.
//!
//! Run with: cargo run -p web-server-demo
//!
//! Configure the remote host with `REMOTE_HOSTNAME`, `REMOTE_USERNAME` and
//! `REMOTE_KEY_PATH` (or a TOML file named by `SHELL_BRIDGE_CONFIG`), then
//! open http://localhost:8000 in your browser.

use std::sync::Arc;

use anyhow::Context;
use axum::{Router, response::Html, routing::get};
use shell_bridge_core::BridgeConfig;
use shell_bridge_pty::SshProvider;
use shell_bridge_telemetry::init_telemetry;
use shell_bridge_transport::{BridgeState, create_router};
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BridgeConfig::load().context("Failed to load configuration")?;
    let _telemetry =
        init_telemetry(&config.telemetry).context("Failed to initialise telemetry")?;

    let provider = SshProvider::new(&config.remote)
        .context("Failed to set up ssh provider")?
        .with_chunk_size(config.session.chunk_size);
    let state = BridgeState::new(Arc::new(provider), &config);

    let app = Router::new()
        .route("/", get(index_handler))
        .merge(create_router(state))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    tracing::info!(
        host = %config.remote.target.host,
        "Server listening on http://{}",
        config.listen_addr
    );

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Shell Bridge</title>
    <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/xterm@5.3.0/css/xterm.css" />
    <script src="https://cdn.jsdelivr.net/npm/xterm@5.3.0/lib/xterm.js"></script>
    <script src="https://cdn.jsdelivr.net/npm/xterm-addon-fit@0.8.0/lib/xterm-addon-fit.js"></script>
    <style>
        body {
            margin: 0;
            padding: 20px;
            background: #1e1e1e;
            font-family: system-ui, sans-serif;
        }
        h1 { color: #fff; margin-bottom: 10px; }
        #terminal-container {
            width: 100%;
            height: calc(100vh - 100px);
        }
        .status {
            color: #888;
            font-size: 14px;
            margin-bottom: 10px;
        }
        .connected { color: #4a4; }
        .disconnected { color: #a44; }
    </style>
</head>
<body>
    <h1>Shell Bridge</h1>
    <div class="status" id="status">Connecting...</div>
    <div id="terminal-container"></div>

    <script>
        const term = new Terminal({
            cursorBlink: true,
            fontSize: 14,
            fontFamily: 'Menlo, Monaco, "Courier New", monospace',
            theme: {
                background: '#1e1e1e',
                foreground: '#d4d4d4',
            }
        });

        const fitAddon = new FitAddon.FitAddon();
        term.loadAddon(fitAddon);
        term.open(document.getElementById('terminal-container'));
        fitAddon.fit();

        const status = document.getElementById('status');
        let ws;

        const decoder = new TextDecoder();

        function connect() {
            const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
            ws = new WebSocket(`${protocol}//${window.location.host}/ws/terminal/`);
            ws.binaryType = 'arraybuffer';

            ws.onopen = () => {
                status.textContent = 'Connected';
                status.className = 'status connected';
            };

            ws.onclose = (event) => {
                status.textContent = `Disconnected (${event.code})`;
                status.className = 'status disconnected';
            };

            ws.onerror = (err) => {
                console.error('WebSocket error:', err);
            };

            ws.onmessage = (event) => {
                if (event.data instanceof ArrayBuffer) {
                    term.write(decoder.decode(new Uint8Array(event.data), { stream: true }));
                    return;
                }
                try {
                    const msg = JSON.parse(event.data);
                    if (msg.message) {
                        term.writeln(`\r\n[${msg.message}]`);
                    }
                } catch (e) {
                    console.error('Failed to parse message:', e);
                }
            };
        }

        // Handle terminal input
        term.onData((data) => {
            if (ws && ws.readyState === WebSocket.OPEN) {
                ws.send(data);
            }
        });

        window.addEventListener('resize', () => fitAddon.fit());

        // Start connection
        connect();
    </script>
</body>
</html>
"#;
