//! Minimal exact-match router shared by the HTTP/1.1 and HTTP/2 dispatch
//! points, grounded on `original_source/src/http/router.c`'s array-based
//! `router_add_handler`/`router_dispatch`/`not_found_handler`. The
//! original's separate AVL-tree-based route table is not carried forward
//! as a second mechanism — one router serves both protocols (`spec.md`
//! §4.7).

use std::sync::Arc;

use crate::parser::{status::Status, HttpMethod};
use crate::response::Response;

/// Matches `original_source/include/http/http.h`'s `MAX_ROUTES`.
pub const MAX_ROUTES: usize = 64;

/// A decoded request, borrowed from whichever protocol parsed it: the
/// HTTP/1.1 read buffer directly, or an owned `:method`/`:path`
/// pseudo-header pulled out of an HPACK-decoded HTTP/2 header block.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub method: HttpMethod,
    pub path: &'a str,
}

type Handler = Arc<dyn for<'a> Fn(&Request<'a>, &mut Response)>;

#[derive(Clone)]
struct Route {
    method: HttpMethod,
    path: String,
    handler: Handler,
}

/// A fixed-capacity table of exact-match routes. First registered match
/// wins; `find`/`dispatch` fall through to a 404 when nothing matches.
/// `Clone`able (an `Arc` bump per route) so the supervisor can hand an
/// independent copy to each forked worker process.
#[derive(Default, Clone)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self {
            routes: Vec::with_capacity(MAX_ROUTES),
        }
    }

    /// Registers `handler` for exact-match `(method, path)`. Silently
    /// drops the registration past `MAX_ROUTES`, logging a warning,
    /// matching the original's fixed-size route array rather than
    /// growing without bound.
    pub fn register<F>(&mut self, method: HttpMethod, path: &str, handler: F)
    where
        F: for<'a> Fn(&Request<'a>, &mut Response) + 'static,
    {
        if self.routes.len() >= MAX_ROUTES {
            log::warn!("router is at capacity ({MAX_ROUTES}), dropping route {method} {path}");
            return;
        }
        self.routes.push(Route {
            method,
            path: path.to_string(),
            handler: Arc::new(handler),
        });
    }

    /// Looks up a route by string method name and path, the shape the
    /// HTTP/2 engine has on hand after HPACK-decoding `:method`/`:path`
    /// pseudo-headers (`spec.md` §4.5/§4.7).
    pub fn find(&self, method: Option<&str>, path: Option<&str>) -> Option<&Route> {
        let method = method?;
        let path = path?;
        self.routes
            .iter()
            .find(|r| r.method.to_string() == method && r.path == path)
    }

    /// Dispatches an HTTP/1.1 request directly: exact match runs its
    /// handler, otherwise a fixed 404 response is written.
    pub fn dispatch(&self, request: &Request<'_>, response: &mut Response) {
        let method_str = request.method.to_string();
        match self.find(Some(&method_str), Some(request.path)) {
            Some(route) => (route.handler)(request, response),
            None => {
                if response.send_data(Status::NotFound, b"Not Found\n").is_err() {
                    log::warn!("404 response did not fit in the response buffer");
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn registered_route_handler_runs_on_exact_match() {
        let mut router = Router::new();
        let called = Rc::new(Cell::new(false));
        let flag = called.clone();
        router.register(HttpMethod::Get, "/", move |_, resp| {
            flag.set(true);
            resp.send_data(Status::r#Ok, b"hi").unwrap();
        });

        let mut resp = Response::new();
        router.dispatch(
            &Request {
                method: HttpMethod::Get,
                path: "/",
            },
            &mut resp,
        );

        assert!(called.get());
        assert!(resp.pending().starts_with(b"HTTP/1.1 200 OK"));
    }

    #[test]
    fn unmatched_route_falls_back_to_404() {
        let router = Router::new();
        let mut resp = Response::new();
        router.dispatch(
            &Request {
                method: HttpMethod::Get,
                path: "/missing",
            },
            &mut resp,
        );
        assert!(resp.pending().starts_with(b"HTTP/1.1 404 Not Found"));
        assert!(resp.pending().ends_with(b"Not Found\n"));
    }

    #[test]
    fn find_matches_by_string_method_and_path() {
        let mut router = Router::new();
        router.register(HttpMethod::Post, "/submit", |_, _| {});
        assert!(router.find(Some("POST"), Some("/submit")).is_some());
        assert!(router.find(Some("GET"), Some("/submit")).is_none());
        assert!(router.find(None, Some("/submit")).is_none());
    }

    #[test]
    fn registration_past_capacity_is_dropped() {
        let mut router = Router::new();
        for i in 0..MAX_ROUTES + 1 {
            let path = format!("/{i}");
            router.register(HttpMethod::Get, &path, |_, _| {});
        }
        assert_eq!(MAX_ROUTES, router.routes.len());
    }
}
