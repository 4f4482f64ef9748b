use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

/// The client address, after looking through the reverse proxy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    header("x-real-ip")
        .and_then(|ip| ip.parse().ok())
        .or_else(|| {
            header("x-forwarded-for")
                .and_then(|list| list.split(',').next())
                .and_then(|ip| ip.trim().parse().ok())
        })
        .or(peer.map(|peer| peer.ip()))
}

pub async fn real_ip(mut request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    if let Some(ip) = client_ip(request.headers(), peer) {
        request.extensions_mut().insert(ClientIp(ip));
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(*value));
        }
        headers
    }

    #[test]
    fn real_ip_header_wins() {
        let headers = headers(&[("x-real-ip", "10.0.0.1"), ("x-forwarded-for", "10.0.0.2")]);
        assert_eq!(client_ip(&headers, None), "10.0.0.1".parse().ok());
    }

    #[test]
    fn first_forwarded_address() {
        let headers = headers(&[("x-forwarded-for", "203.0.113.7, 10.0.0.2")]);
        assert_eq!(client_ip(&headers, None), "203.0.113.7".parse().ok());
    }

    #[test]
    fn falls_back_to_peer() {
        let peer: SocketAddr = "192.0.2.1:4000".parse().unwrap();
        assert_eq!(client_ip(&HeaderMap::new(), Some(peer)), Some(peer.ip()));
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }
}
