//! HTTP front door: routes `/webhook` to the [`Relay`].

use crate::relay::Relay;
use bytes::Bytes;
use eyre::Context;
use http::header::{ALLOW, CONTENT_TYPE};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

pub const WEBHOOK_PATH: &str = "/webhook";

/// Accepts connections until `shutdown` resolves, serving each on its own task.
pub async fn serve(
    listener: TcpListener,
    relay: Arc<Relay>,
    shutdown: impl Future<Output = ()>,
) -> eyre::Result<()> {
    let mut shutdown = std::pin::pin!(shutdown);
    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted.context("accept connection")?,
            () = &mut shutdown => {
                tracing::info!("shutting down webhook server");
                return Ok(());
            }
        };

        let relay = Arc::clone(&relay);
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let relay = Arc::clone(&relay);
                async move { Ok::<_, Infallible>(route(&relay, req).await) }
            });
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                tracing::debug!(%peer, error = %e, "connection ended with error");
            }
        });
    }
}

/// Dispatches one request.
#[tracing::instrument(skip_all, fields(method = %req.method(), path = req.uri().path()))]
pub async fn route<B>(relay: &Relay, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    if req.uri().path() != WEBHOOK_PATH {
        return json_error(StatusCode::NOT_FOUND, "Not found");
    }

    let method = req.method().clone();
    match method {
        Method::GET => verify(req.uri().query()),
        Method::POST => {
            let body = match req.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    tracing::warn!(error = %e, "could not read webhook body");
                    return json_error(StatusCode::BAD_REQUEST, "Invalid request");
                }
            };
            deliver(relay, &body).await
        }
        _ => {
            let mut response = json_error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
            response
                .headers_mut()
                .insert(ALLOW, http::HeaderValue::from_static("GET, POST"));
            response
        }
    }
}

/// Echoes the platform's `hub.challenge` so it accepts the subscription.
fn verify(query: Option<&str>) -> Response<Full<Bytes>> {
    let challenge = form_urlencoded::parse(query.unwrap_or("").as_bytes())
        .find(|(k, _)| k == "hub.challenge")
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default();
    tracing::debug!(challenge, "answering webhook verification");
    plain(StatusCode::OK, challenge)
}

async fn deliver(relay: &Relay, body: &[u8]) -> Response<Full<Bytes>> {
    match relay.handle_delivery(body).await {
        Ok(relayed) => json(StatusCode::OK, &relayed),
        Err(e) => {
            let status = e.status_code();
            if status.is_server_error() {
                tracing::error!(error = %e, "relay failed");
            } else {
                tracing::info!(%status, reason = %e, "delivery rejected");
            }
            json_error(status, &e.to_string())
        }
    }
}

fn plain(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn json(status: StatusCode, body: &impl serde::Serialize) -> Response<Full<Bytes>> {
    let body = match serde_json::to_vec(body) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "could not serialize response body");
            return plain(StatusCode::INTERNAL_SERVER_ERROR, String::new());
        }
    };
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, http::HeaderValue::from_static("application/json"));
    response
}

fn json_error(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json(status, &serde_json::json!({ "error": message }))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_string(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn challenge_is_echoed_verbatim() {
        for challenge in ["1158201444", "with space", "ünïcode&more"] {
            let query: String = form_urlencoded::Serializer::new(String::new())
                .append_pair("hub.mode", "subscribe")
                .append_pair("hub.challenge", challenge)
                .finish();
            let response = verify(Some(&query));
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_string(response).await, challenge);
        }
    }

    #[tokio::test]
    async fn get_without_challenge_is_empty() {
        let response = verify(Some("hub.mode=subscribe"));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "");
        assert_eq!(body_string(verify(None)).await, "");
    }

    #[tokio::test]
    async fn error_bodies_are_json() {
        let response = json_error(StatusCode::FORBIDDEN, "Unauthorized or missing sender");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            http::HeaderValue::from_static("application/json")
        );
        assert_eq!(
            body_string(response).await,
            r#"{"error":"Unauthorized or missing sender"}"#
        );
    }
}
