use std::sync::LazyLock;

use regex::Regex;

/// Reserved prefix for pipeline execution
pub const ORCHESTRATE_PREFIX: &str = "/orchestrate";

static ORCHESTRATE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/orchestrate/([^/]+)(/.*)?$").expect("static regex"));
static BACKEND_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([a-zA-Z0-9_-]+)(/.*)?$").expect("static regex"));

/// Where an inbound request goes, derived from its path alone
#[derive(Debug, Clone, PartialEq)]
pub enum RouteTarget {
    /// `/orchestrate/<pipeline>[/sub/path]`
    Orchestrate { pipeline: String, sub_path: String },
    /// `/orchestrate` or `/orchestrate/` with no pipeline name
    MissingPipeline,
    /// `/<backend>[/sub/path]`
    Backend { name: String, sub_path: String },
    NotFound,
}

/// Classify a request path.
/// Pure function - no I/O. The sub-path always starts with `/`.
pub fn resolve_route(path: &str) -> RouteTarget {
    let reserved = path == ORCHESTRATE_PREFIX
        || path
            .strip_prefix(ORCHESTRATE_PREFIX)
            .is_some_and(|rest| rest.starts_with('/'));

    if reserved {
        return match ORCHESTRATE_PATH.captures(path) {
            Some(caps) => RouteTarget::Orchestrate {
                pipeline: caps[1].to_string(),
                sub_path: sub_path(caps.get(2).map(|m| m.as_str())),
            },
            None => RouteTarget::MissingPipeline,
        };
    }

    match BACKEND_PATH.captures(path) {
        Some(caps) => RouteTarget::Backend {
            name: caps[1].to_string(),
            sub_path: sub_path(caps.get(2).map(|m| m.as_str())),
        },
        None => RouteTarget::NotFound,
    }
}

fn sub_path(rest: Option<&str>) -> String {
    match rest {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(name: &str, sub_path: &str) -> RouteTarget {
        RouteTarget::Backend {
            name: name.to_string(),
            sub_path: sub_path.to_string(),
        }
    }

    fn orchestrate(pipeline: &str, sub_path: &str) -> RouteTarget {
        RouteTarget::Orchestrate {
            pipeline: pipeline.to_string(),
            sub_path: sub_path.to_string(),
        }
    }

    #[test]
    fn test_backend_routes() {
        assert_eq!(resolve_route("/resize"), backend("resize", "/"));
        assert_eq!(resolve_route("/resize/"), backend("resize", "/"));
        assert_eq!(resolve_route("/resize/v1/run"), backend("resize", "/v1/run"));
        assert_eq!(resolve_route("/my_fn-2/x"), backend("my_fn-2", "/x"));
    }

    #[test]
    fn test_orchestrate_routes() {
        assert_eq!(resolve_route("/orchestrate/thumbs"), orchestrate("thumbs", "/"));
        assert_eq!(
            resolve_route("/orchestrate/thumbs/api/run"),
            orchestrate("thumbs", "/api/run")
        );
    }

    #[test]
    fn test_orchestrate_without_name() {
        assert_eq!(resolve_route("/orchestrate"), RouteTarget::MissingPipeline);
        assert_eq!(resolve_route("/orchestrate/"), RouteTarget::MissingPipeline);
        assert_eq!(resolve_route("/orchestrate//x"), RouteTarget::MissingPipeline);
    }

    #[test]
    fn test_prefix_lookalike_is_a_backend() {
        assert_eq!(resolve_route("/orchestrater"), backend("orchestrater", "/"));
    }

    #[test]
    fn test_invalid_backend_names() {
        assert_eq!(resolve_route("/a.b/x"), RouteTarget::NotFound);
        assert_eq!(resolve_route("//x"), RouteTarget::NotFound);
        assert_eq!(resolve_route("/%2e%2e"), RouteTarget::NotFound);
    }
}
