//! Request routing onto the dispatcher.

use magloop_core::DynDispatcher;
use magloop_core::status::{self, Reply};

use crate::http::Request;

pub fn route(dispatcher: &DynDispatcher, req: &Request) -> Reply {
    match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/") => status::banner_reply(),
        ("GET", "/info") => status::info_reply(&dispatcher.handle_info()),
        ("GET", "/park") => match dispatcher.handle_park() {
            Ok(report) => status::park_reply(&report),
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "park failed");
                status::error_reply(&e)
            }
        },
        ("POST", "/move") => match dispatcher.handle_move(&req.body) {
            Ok(report) => status::move_reply(&report),
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "move failed");
                status::error_reply(&e)
            }
        },
        (method, path) => status::not_found_reply(path, method, &req.args),
    }
}
