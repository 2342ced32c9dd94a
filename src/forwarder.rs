use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use tracing::{debug, error, trace};

use crate::payload::{HttpBody, MetricPayload};

/// Delivery of serialized payloads to the agent.
///
/// The variant is fixed when the relay is built. Every encoding or transport
/// failure is logged and dropped here; nothing propagates to the caller, so
/// metrics emission can never crash or stall the instrumented application.
pub(crate) enum Forwarder {
    Udp(UdpForwarder),
    Http(HttpForwarder),
}

impl Forwarder {
    /// Sends a single payload.
    pub(crate) fn send(&self, payload: &MetricPayload) {
        self.send_batch(std::slice::from_ref(payload));
    }

    /// Sends a batch of payloads: one datagram per payload over UDP, or one
    /// POST containing every point over HTTP.
    pub(crate) fn send_batch(&self, payloads: &[MetricPayload]) {
        if payloads.is_empty() {
            return;
        }

        match self {
            Forwarder::Udp(udp) => udp.send_each(payloads),
            Forwarder::Http(http) => http.post(payloads),
        }
    }
}

/// Connectionless delivery: one JSON datagram per payload, no acknowledgement.
pub(crate) struct UdpForwarder {
    socket: UdpSocket,
}

impl UdpForwarder {
    /// Binds a local socket and connects it to the resolved agent addresses.
    pub(crate) fn new(addrs: &[SocketAddr], write_timeout: Duration) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect(addrs)?;
        socket.set_write_timeout(Some(write_timeout))?;
        Ok(UdpForwarder { socket })
    }

    fn send_each(&self, payloads: &[MetricPayload]) {
        for payload in payloads {
            let buf = match serde_json::to_vec(payload) {
                Ok(buf) => buf,
                Err(e) => {
                    error!(error = %e, "Failed to encode metric payload.");
                    continue;
                }
            };

            match self.socket.send(&buf) {
                Ok(sent) => trace!(bytes = sent, "Sent metric datagram."),
                Err(e) => error!(error = %e, "Failed to send metric datagram."),
            }
        }
    }
}

/// Synchronous HTTP delivery: one POST per batch, with a finite timeout.
pub(crate) struct HttpForwarder {
    client: reqwest::blocking::Client,
    url: reqwest::Url,
}

impl HttpForwarder {
    pub(crate) fn new(url: reqwest::Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(HttpForwarder { client, url })
    }

    fn post(&self, payloads: &[MetricPayload]) {
        let body = HttpBody::from_payloads(payloads);
        let result = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status);

        match result {
            Ok(response) => {
                debug!(status = %response.status(), points = payloads.len(), "Posted metric points.");
            }
            Err(e) => error!(error = %e, "Failed to post metric points."),
        }
    }
}
