use crate::authorization::Identity;
use crate::context::AppContext;
use crate::error::AgoraError;
use crate::user::find_identity;
use actix_session::Session;
use actix_web::dev::{self, Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{web::Data, Error, FromRequest, HttpMessage, HttpRequest};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Session key holding the signed-in user's id.
pub const SESSION_USER_KEY: &str = "user_id";

/// Client data resolved once per request.
#[derive(Clone, Debug)]
pub struct ClientCtxInner {
    /// None is a guest.
    pub identity: Option<Identity>,
    /// Time the request started.
    pub request_start: Instant,
}

impl Default for ClientCtxInner {
    fn default() -> Self {
        Self {
            identity: None,
            request_start: Instant::now(),
        }
    }
}

impl ClientCtxInner {
    pub async fn from_session(session: &Session, ctx: &AppContext) -> Self {
        let user_id = match session.get::<i32>(SESSION_USER_KEY) {
            Ok(id) => id,
            Err(e) => {
                log::warn!("Unreadable session user id: {}", e);
                None
            }
        };

        let identity = match user_id {
            Some(id) => match find_identity(&ctx.db, id).await {
                Ok(Some(identity)) => Some(identity),
                Ok(None) => {
                    log::debug!("Session refers to missing user {}", id);
                    None
                }
                Err(e) => {
                    log::error!("Failed to load identity for user {}: {}", id, e);
                    None
                }
            },
            None => None,
        };

        ClientCtxInner {
            identity,
            ..Default::default()
        }
    }
}

/// Client context passed to routes.
#[derive(Clone, Debug)]
pub struct ClientCtx(Data<ClientCtxInner>);

impl Default for ClientCtx {
    fn default() -> Self {
        Self(Data::new(ClientCtxInner::default()))
    }
}

impl ClientCtx {
    pub fn new(identity: Option<Identity>) -> Self {
        Self(Data::new(ClientCtxInner {
            identity,
            ..Default::default()
        }))
    }

    /// Returns either the user's id or None.
    pub fn get_id(&self) -> Option<i32> {
        self.0.identity.as_ref().map(|i| i.user_id)
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.0.identity.as_ref()
    }

    pub fn is_user(&self) -> bool {
        self.0.identity.is_some()
    }

    /// The signed-in identity, or `Unauthenticated`.
    pub fn require_login(&self) -> Result<&Identity, AgoraError> {
        self.identity().ok_or(AgoraError::Unauthenticated)
    }

    /// Returns Duration representing request time.
    pub fn request_time(&self) -> Duration {
        Instant::now() - self.0.request_start
    }
}

/// This implementation is what actually provides the `client: ClientCtx` in the parameters of route functions.
impl FromRequest for ClientCtx {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let client = match req.extensions().get::<Data<ClientCtxInner>>() {
            Some(inner) => ClientCtx(inner.clone()),
            None => ClientCtx::default(),
        };
        ready(Ok(client))
    }
}

impl<S: 'static, B> Transform<S, ServiceRequest> for ClientCtx
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ClientCtxMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ClientCtxMiddleware {
            service: Rc::new(service),
        }))
    }
}

/// Resolves the session user into a [`ClientCtx`] before the handler runs.
pub struct ClientCtxMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for ClientCtxMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();

        // Borrows of `req` must be done in this order.
        let (httpreq, payload) = req.into_parts();
        let session = Session::extract(&httpreq).into_inner();
        let req = ServiceRequest::from_parts(httpreq, payload);

        Box::pin(async move {
            if let Some(ctx) = req.app_data::<Data<AppContext>>() {
                let ctx = ctx.clone();
                match session {
                    Ok(session) => {
                        let inner = ClientCtxInner::from_session(&session, &ctx).await;
                        req.extensions_mut().insert(Data::new(inner));
                    }
                    Err(err) => {
                        log::error!("Unable to extract Session data in middleware: {}", err);
                    }
                }
            }

            svc.call(req).await
        })
    }
}
