use std::net::IpAddr;
use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use http::Request;

/// Derives a stable identifier for the caller of a request.
///
/// Returning `None` sends the request to the shared fallback bucket.
pub trait IdentityResolver: Clone + Send + Sync + 'static {
    fn resolve<B>(&self, req: &Request<B>) -> Option<String>;
}

/// Identifies callers by the transport peer address recorded by
/// `axum::serve(.., app.into_make_service_with_connect_info::<SocketAddr>())`.
///
/// Forwarding headers are deliberately ignored; they are caller controlled.
#[derive(Clone, Copy, Debug, Default)]
pub struct PeerAddr;

impl IdentityResolver for PeerAddr {
    fn resolve<B>(&self, req: &Request<B>) -> Option<String> {
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| canonical_ip(addr.ip()))
    }
}

/// The same host always renders the same way: IPv4-mapped IPv6 addresses are
/// folded back to IPv4 and IPv6 uses its compressed RFC 5952 form.
pub fn canonical_ip(ip: IpAddr) -> String {
    ip.to_canonical().to_string()
}
