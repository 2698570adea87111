//! 跨域中间件
//!
//! dev 环境镜像任意来源；其余环境只接受与请求 Host 同源的 Origin。

use std::time::Duration;

use axum::http::{header, HeaderValue, Method, Uri};
use tower_http::cors::{AllowOrigin, CorsLayer};

pub fn cors_layer(env: &str) -> CorsLayer {
    let allow_origin = if env == "dev" {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::predicate(|origin: &HeaderValue, parts| {
            let Some(host) = parts
                .headers
                .get(header::HOST)
                .and_then(|value| value.to_str().ok())
            else {
                return false;
            };
            origin
                .to_str()
                .ok()
                .and_then(|raw| raw.parse::<Uri>().ok())
                .and_then(|uri| {
                    uri.authority()
                        .map(|authority| authority.as_str().eq_ignore_ascii_case(host))
                })
                .unwrap_or(false)
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400))
}
