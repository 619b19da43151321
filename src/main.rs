mod auth;
mod backup;
mod db;
mod ipc;
mod reassign;

use std::io::{self, BufRead, StdoutLock, Write};

fn emit(stdout: &mut StdoutLock<'_>, resp: &serde_json::Value) {
    let line = serde_json::to_string(resp).unwrap_or_else(|_| "{\"ok\":false}".to_string());
    let _ = writeln!(stdout, "{}", line);
    let _ = stdout.flush();
}

fn main() {
    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    // One request per line in, one response per line out. A line that fails
    // to parse has no request id to echo, so the reply carries none.
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => {
                let resp = ipc::handle_request(&mut state, req);
                emit(&mut stdout, &resp);
            }
            Err(e) => {
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                emit(&mut stdout, &resp);
            }
        }
    }
}
