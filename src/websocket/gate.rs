use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;

use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, ResponseError};
use futures::future::LocalBoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::WebSocketConfig;
use crate::error::AppError;
use crate::websocket::connection::Connection;
use crate::websocket::pool::ConnectionPool;
use crate::websocket::upgrade::upgrade;

/// Middleware that owns the real-time endpoint.
///
/// Requests for `config.path` are upgraded into a session (or refused with
/// 400 when the handshake is invalid) and never reach the wrapped service.
/// Every other request passes through untouched.
#[derive(Clone)]
pub struct UpgradeGate {
    config: Rc<WebSocketConfig>,
    pool: Arc<ConnectionPool>,
    shutdown: CancellationToken,
}

impl UpgradeGate {
    pub fn new(config: WebSocketConfig, pool: Arc<ConnectionPool>, shutdown: CancellationToken) -> Self {
        Self {
            config: Rc::new(config),
            pool,
            shutdown,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for UpgradeGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = UpgradeGateMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(UpgradeGateMiddleware {
            service,
            config: self.config.clone(),
            pool: self.pool.clone(),
            shutdown: self.shutdown.clone(),
        }))
    }
}

pub struct UpgradeGateMiddleware<S> {
    service: S,
    config: Rc<WebSocketConfig>,
    pool: Arc<ConnectionPool>,
    shutdown: CancellationToken,
}

impl<S> UpgradeGateMiddleware<S> {
    /// Starts a session on the current worker and returns the handshake
    /// response, or the 400 error response when the request is not a valid upgrade.
    fn accept(&self, req: ServiceRequest) -> ServiceResponse {
        let (http_req, payload) = req.into_parts();
        let peer_addr = http_req
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let (response, transport) = match upgrade(&http_req, payload, self.config.max_message_size) {
            Ok(upgraded) => upgraded,
            Err(e) => {
                warn!("Rejected upgrade request from {}: {}", peer_addr, e);
                let response = AppError::from(e).error_response();
                return ServiceResponse::new(http_req, response);
            }
        };

        let connection = Connection::new((*self.config).clone(), self.shutdown.child_token());
        let pool = self.pool.clone();

        actix_web::rt::spawn(async move {
            let id = connection.id();
            pool.add(id, peer_addr.clone()).await;
            info!("Client connected: {} (id: {})", peer_addr, id);

            let outcome = connection.run(transport).await;

            let connected_for = pool
                .remove(&id)
                .await
                .map(|info| (chrono::Utc::now() - info.connected_at).num_milliseconds())
                .unwrap_or_default();
            info!(
                "Client disconnected: {} (id: {}, messages: {}, duration: {}ms)",
                peer_addr, id, outcome.messages_processed, connected_for
            );
        });

        ServiceResponse::new(http_req, response)
    }
}

impl<S, B> Service<ServiceRequest> for UpgradeGateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if req.path() != self.config.path {
            let fut = self.service.call(req);
            return Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) });
        }

        let response = self.accept(req).map_into_right_body();
        Box::pin(async move { Ok(response) })
    }
}
