// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::net::SocketAddr;

use headers::{Authorization, ContentLength, HeaderMapExt, Host, UserAgent, authorization::Basic};
use http::{Method, Request, Version};
use opentelemetry::KeyValue;
use opentelemetry_semantic_conventions::attribute::{
    CLIENT_ADDRESS, ENDUSER_ID, HTTP_REQUEST_BODY_SIZE, HTTP_REQUEST_METHOD, HTTP_ROUTE,
    NETWORK_PEER_ADDRESS, NETWORK_PEER_PORT, NETWORK_PROTOCOL_NAME, NETWORK_PROTOCOL_VERSION,
    NETWORK_TRANSPORT, SERVER_ADDRESS, SERVER_PORT, SERVICE_NAME, TELEMETRY_SDK_LANGUAGE,
    URL_PATH, URL_QUERY, URL_SCHEME, USER_AGENT_ORIGINAL,
};

#[inline]
fn otel_http_method<B>(request: &Request<B>) -> &'static str {
    match request.method() {
        &Method::OPTIONS => "OPTIONS",
        &Method::GET => "GET",
        &Method::POST => "POST",
        &Method::PUT => "PUT",
        &Method::DELETE => "DELETE",
        &Method::HEAD => "HEAD",
        &Method::TRACE => "TRACE",
        &Method::CONNECT => "CONNECT",
        &Method::PATCH => "PATCH",
        _other => "_OTHER",
    }
}

#[inline]
fn otel_net_protocol_version<B>(request: &Request<B>) -> &'static str {
    match request.version() {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_11 => "1.1",
        Version::HTTP_2 => "2.0",
        Version::HTTP_3 => "3.0",
        _other => "_OTHER",
    }
}

/// The address of the remote peer, if the server added it to the request
/// extensions
fn peer_addr<B>(request: &Request<B>) -> Option<SocketAddr> {
    request.extensions().get::<SocketAddr>().copied()
}

fn network_attributes<B>(request: &Request<B>, attributes: &mut Vec<KeyValue>) {
    attributes.push(KeyValue::new(NETWORK_TRANSPORT, "tcp"));
    attributes.push(KeyValue::new(NETWORK_PROTOCOL_NAME, "http"));
    attributes.push(KeyValue::new(
        NETWORK_PROTOCOL_VERSION,
        otel_net_protocol_version(request),
    ));

    if let Some(addr) = peer_addr(request) {
        attributes.push(KeyValue::new(NETWORK_PEER_ADDRESS, addr.ip().to_string()));
        attributes.push(KeyValue::new(NETWORK_PEER_PORT, i64::from(addr.port())));
    }
}

fn server_attributes<B>(request: &Request<B>, attributes: &mut Vec<KeyValue>) {
    let uri = request.uri();

    attributes.push(KeyValue::new(HTTP_REQUEST_METHOD, otel_http_method(request)));
    attributes.push(KeyValue::new(HTTP_ROUTE, uri.path().to_owned()));
    attributes.push(KeyValue::new(URL_PATH, uri.path().to_owned()));
    attributes.push(KeyValue::new(
        URL_SCHEME,
        uri.scheme_str().unwrap_or("http").to_owned(),
    ));

    if let Some(query) = uri.query() {
        attributes.push(KeyValue::new(URL_QUERY, query.to_owned()));
    }

    // Prefer the Host header, which is what the client asked for, over the
    // authority of the request target
    let host = request.headers().typed_get::<Host>();
    let (address, port) = match &host {
        Some(host) => (Some(host.hostname()), host.port()),
        None => (uri.host(), uri.port_u16()),
    };

    if let Some(address) = address {
        attributes.push(KeyValue::new(SERVER_ADDRESS, address.to_owned()));
    }

    if let Some(port) = port {
        attributes.push(KeyValue::new(SERVER_PORT, i64::from(port)));
    }

    if let Some(user_agent) = request.headers().typed_get::<UserAgent>() {
        attributes.push(KeyValue::new(
            USER_AGENT_ORIGINAL,
            user_agent.as_str().to_owned(),
        ));
    }
}

fn enduser_attributes<B>(request: &Request<B>, attributes: &mut Vec<KeyValue>) {
    let Some(authorization) = request.headers().typed_get::<Authorization<Basic>>() else {
        return;
    };

    let username = authorization.username();
    if !username.is_empty() {
        attributes.push(KeyValue::new(ENDUSER_ID, username.to_owned()));
    }
}

fn client_attributes<B>(request: &Request<B>, attributes: &mut Vec<KeyValue>) {
    let forwarded_for = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    if let Some(client) = forwarded_for {
        attributes.push(KeyValue::new(CLIENT_ADDRESS, client.to_owned()));
    } else if let Some(addr) = peer_addr(request) {
        attributes.push(KeyValue::new(CLIENT_ADDRESS, addr.ip().to_string()));
    }

    if let Some(ContentLength(length)) = request.headers().typed_get::<ContentLength>() {
        if let Ok(length) = i64::try_from(length) {
            attributes.push(KeyValue::new(HTTP_REQUEST_BODY_SIZE, length));
        }
    }
}

/// Compute the attributes of the span for a request.
///
/// This includes the network, HTTP server, end-user and client attributes
/// from the OpenTelemetry semantic conventions, the SDK language, and the
/// given service name.
///
/// The address of the remote peer is only known if the server added its
/// [`SocketAddr`] to the request extensions.
#[must_use]
pub fn request_attributes<B>(request: &Request<B>, service_name: &str) -> Vec<KeyValue> {
    let mut attributes = Vec::with_capacity(20);

    network_attributes(request, &mut attributes);
    server_attributes(request, &mut attributes);
    enduser_attributes(request, &mut attributes);
    client_attributes(request, &mut attributes);

    attributes.push(KeyValue::new(TELEMETRY_SDK_LANGUAGE, "rust"));
    attributes.push(KeyValue::new(SERVICE_NAME, service_name.to_owned()));

    attributes
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use opentelemetry::Value;

    use super::*;

    fn as_map(attributes: Vec<KeyValue>) -> HashMap<String, Value> {
        attributes
            .into_iter()
            .map(|kv| (kv.key.as_str().to_owned(), kv.value))
            .collect()
    }

    #[test]
    fn test_minimal_request() {
        let request = Request::builder().uri("/foo").body(()).unwrap();
        let attributes = as_map(request_attributes(&request, "checkout"));

        assert_eq!(attributes[NETWORK_TRANSPORT], Value::from("tcp"));
        assert_eq!(attributes[NETWORK_PROTOCOL_NAME], Value::from("http"));
        assert_eq!(attributes[NETWORK_PROTOCOL_VERSION], Value::from("1.1"));
        assert_eq!(attributes[HTTP_REQUEST_METHOD], Value::from("GET"));
        assert_eq!(attributes[HTTP_ROUTE], Value::from("/foo"));
        assert_eq!(attributes[URL_PATH], Value::from("/foo"));
        assert_eq!(attributes[URL_SCHEME], Value::from("http"));
        assert_eq!(attributes[TELEMETRY_SDK_LANGUAGE], Value::from("rust"));
        assert_eq!(attributes[SERVICE_NAME], Value::from("checkout"));

        assert!(!attributes.contains_key(URL_QUERY));
        assert!(!attributes.contains_key(SERVER_ADDRESS));
        assert!(!attributes.contains_key(CLIENT_ADDRESS));
        assert!(!attributes.contains_key(ENDUSER_ID));
        assert!(!attributes.contains_key(NETWORK_PEER_ADDRESS));
    }

    #[test]
    fn test_full_request() {
        let mut request = Request::builder()
            .method(Method::POST)
            .version(Version::HTTP_2)
            .uri("/orders?page=2")
            .header("host", "shop.example.com:8443")
            .header("user-agent", "curl/8.5.0")
            // "alice:secret"
            .header("authorization", "Basic YWxpY2U6c2VjcmV0")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("content-length", "42")
            .body(())
            .unwrap();
        request
            .extensions_mut()
            .insert(SocketAddr::from(([10, 0, 0, 1], 51234)));

        let attributes = as_map(request_attributes(&request, "checkout"));

        assert_eq!(attributes[NETWORK_PROTOCOL_VERSION], Value::from("2.0"));
        assert_eq!(attributes[NETWORK_PEER_ADDRESS], Value::from("10.0.0.1"));
        assert_eq!(attributes[NETWORK_PEER_PORT], Value::I64(51234));
        assert_eq!(attributes[HTTP_REQUEST_METHOD], Value::from("POST"));
        assert_eq!(attributes[URL_PATH], Value::from("/orders"));
        assert_eq!(attributes[URL_QUERY], Value::from("page=2"));
        assert_eq!(attributes[SERVER_ADDRESS], Value::from("shop.example.com"));
        assert_eq!(attributes[SERVER_PORT], Value::I64(8443));
        assert_eq!(attributes[USER_AGENT_ORIGINAL], Value::from("curl/8.5.0"));
        assert_eq!(attributes[ENDUSER_ID], Value::from("alice"));
        assert_eq!(attributes[CLIENT_ADDRESS], Value::from("203.0.113.7"));
        assert_eq!(attributes[HTTP_REQUEST_BODY_SIZE], Value::I64(42));
    }

    #[test]
    fn test_client_address_falls_back_to_peer() {
        let mut request = Request::builder().uri("/").body(()).unwrap();
        request
            .extensions_mut()
            .insert(SocketAddr::from(([192, 0, 2, 10], 4000)));

        let attributes = as_map(request_attributes(&request, "checkout"));
        assert_eq!(attributes[CLIENT_ADDRESS], Value::from("192.0.2.10"));
    }

    #[test]
    fn test_unknown_method() {
        let request = Request::builder()
            .method(Method::from_bytes(b"PURGE").unwrap())
            .uri("/cache")
            .body(())
            .unwrap();

        let attributes = as_map(request_attributes(&request, "checkout"));
        assert_eq!(attributes[HTTP_REQUEST_METHOD], Value::from("_OTHER"));
    }

    #[test]
    fn test_absolute_uri_without_host_header() {
        let request = Request::builder()
            .uri("https://api.example.com:9000/v1")
            .body(())
            .unwrap();

        let attributes = as_map(request_attributes(&request, "checkout"));
        assert_eq!(attributes[URL_SCHEME], Value::from("https"));
        assert_eq!(attributes[SERVER_ADDRESS], Value::from("api.example.com"));
        assert_eq!(attributes[SERVER_PORT], Value::I64(9000));
    }
}
