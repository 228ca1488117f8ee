//! Request Pipeline
//!
//! Every inbound request passes identity resolution, the block list, the rate
//! limiter, input validation (state-changing methods), the upload policy
//! (upload route) and bearer authentication (protected routes), in that
//! order. The first stage that refuses the request records exactly one
//! security event and ends it; no later stage runs.

use axum::{
    Json,
    body::{Body, Bytes},
    extract::{FromRequest, Multipart, Request},
    http::{HeaderValue, Method, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::config::AppConfig;
use crate::error::{ErrorResponse, Result};
use crate::observability::PipelineMetrics;
use crate::security::auth::{AuthenticatedSubject, TokenAuthenticator, TokenError, bearer_token};
use crate::security::clock::Clock;
use crate::security::events::{EventType, SecurityEventLog};
use crate::security::identity::{ClientIdentity, IdentityResolver};
use crate::security::rate_limit::{BlockList, RateLimitResult, RateLimiter};
use crate::security::upload::{UploadPolicy, UploadViolation, sanitize_filename};
use crate::security::validation::{PatternValidator, Violation, decode_lossy, preview};

/// Room for multipart boundaries and text fields on top of the file ceiling
pub const UPLOAD_ENVELOPE_BYTES: usize = 1024 * 1024;

/// Characters of offending payload kept in event details
pub const PREVIEW_CHARS: usize = 100;

const UPLOAD_FILE_FIELD: &str = "file";
const UPLOAD_CATEGORIES_FIELD: &str = "categories";

/// Pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolve,
    BlockCheck,
    RateLimit,
    InputValidation,
    UploadCheck,
    Authentication,
    /// The stage task died before reporting where it was
    Unknown,
}

/// Client-visible rejection category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    Blocked,
    RateLimited { retry_after: u64 },
    InvalidInput,
    UploadRejected { too_large: bool },
    Unauthenticated,
    InternalFailure,
}

impl RejectionKind {
    pub fn status(&self) -> StatusCode {
        match self {
            RejectionKind::Blocked => StatusCode::FORBIDDEN,
            RejectionKind::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            RejectionKind::InvalidInput => StatusCode::BAD_REQUEST,
            RejectionKind::UploadRejected { too_large: true } => StatusCode::PAYLOAD_TOO_LARGE,
            RejectionKind::UploadRejected { too_large: false } => StatusCode::BAD_REQUEST,
            RejectionKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            RejectionKind::InternalFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RejectionKind::Blocked => "ACCESS_DENIED",
            RejectionKind::RateLimited { .. } => "RATE_LIMITED",
            RejectionKind::InvalidInput => "INVALID_INPUT",
            RejectionKind::UploadRejected { .. } => "UPLOAD_REJECTED",
            RejectionKind::Unauthenticated => "UNAUTHORIZED",
            RejectionKind::InternalFailure => "INTERNAL_ERROR",
        }
    }
}

/// Terminal outcome of a refused request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub stage: Stage,
    pub kind: RejectionKind,
    pub event_type: EventType,
}

impl Rejection {
    pub fn new(stage: Stage, kind: RejectionKind, event_type: EventType) -> Self {
        Self {
            stage,
            kind,
            event_type,
        }
    }

    pub fn internal(stage: Stage) -> Self {
        Self::new(stage, RejectionKind::InternalFailure, EventType::InternalError)
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    /// Generic message shown to the client
    pub fn message(&self) -> &'static str {
        match self.event_type {
            EventType::BlockedIpAccess => "Access denied",
            EventType::RateLimitExceeded => "Rate limit exceeded",
            EventType::MaliciousInput => "Invalid input detected",
            EventType::MaliciousQueryParam => "Invalid query parameter",
            EventType::MaliciousCategories => "Invalid categories parameter",
            EventType::RequestTooLarge => "Request too large",
            EventType::InvalidFileType => "Invalid file type",
            EventType::FileTooLarge => "File too large",
            EventType::MaliciousFileContent => "File content validation failed",
            EventType::MalformedUpload => "File upload validation failed",
            EventType::MissingAuth => "Missing or invalid authorization header",
            EventType::InvalidToken | EventType::ExpiredToken => "Invalid or expired token",
            EventType::SuspiciousFilename | EventType::InternalError => "Internal server error",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.stage, self.event_type)
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse::new(self.kind.code(), self.message()));
        let mut response = (self.status(), body).into_response();
        if let RejectionKind::RateLimited { retry_after } = self.kind {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        }
        response
    }
}

/// Upload that passed the policy, attached to the request for the handler
#[derive(Debug, Clone)]
pub struct ScreenedUpload {
    /// Sanitized filename
    pub filename: String,
    pub original_filename: String,
    pub size: u64,
    pub content: Bytes,
    pub categories: Option<String>,
}

#[derive(Debug)]
struct FilePart {
    field: String,
    filename: String,
    content: Bytes,
}

#[derive(Debug, Default)]
struct MultipartForm {
    text_fields: Vec<(String, String)>,
    files: Vec<FilePart>,
}

impl MultipartForm {
    fn text(&self, name: &str) -> Option<&str> {
        self.text_fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    fn take_file(&mut self, name: &str) -> Option<FilePart> {
        let index = self.files.iter().position(|part| part.field == name)?;
        Some(self.files.remove(index))
    }
}

/// What the stages know about the request being screened
#[derive(Debug, Clone)]
struct RequestInfo {
    identity: ClientIdentity,
    method: Method,
    path: String,
}

/// The request-defense pipeline
pub struct SecurityPipeline {
    resolver: IdentityResolver,
    block_list: Arc<BlockList>,
    rate_limiter: RateLimiter,
    validator: Arc<PatternValidator>,
    upload_policy: UploadPolicy,
    authenticator: Arc<TokenAuthenticator>,
    events: SecurityEventLog,
    public_routes: HashSet<String>,
    upload_route: String,
    max_request_size: usize,
    metrics: Arc<PipelineMetrics>,
}

impl fmt::Debug for SecurityPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityPipeline")
            .field("resolver", &self.resolver)
            .field("blocked", &self.block_list.len())
            .field("rate_limit", self.rate_limiter.config())
            .field("signatures", &self.validator.signature_count())
            .field("public_routes", &self.public_routes)
            .field("upload_route", &self.upload_route)
            .finish_non_exhaustive()
    }
}

impl SecurityPipeline {
    /// Assemble every stage from the loaded configuration
    pub fn from_config(
        config: &AppConfig,
        events: SecurityEventLog,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let validator = Arc::new(PatternValidator::new(&config.validation)?);
        let block_list = Arc::new(BlockList::new());

        Ok(Self {
            resolver: IdentityResolver::from_settings(&config.security),
            rate_limiter: RateLimiter::from_settings(
                &config.security,
                Arc::clone(&block_list),
                Arc::clone(&clock),
            ),
            block_list,
            upload_policy: UploadPolicy::from_settings(&config.upload, Arc::clone(&validator)),
            validator,
            authenticator: Arc::new(TokenAuthenticator::from_settings(&config.security, clock)),
            events,
            public_routes: config.security.public_routes.iter().cloned().collect(),
            upload_route: config.upload.route.clone(),
            max_request_size: config.server.max_request_size,
            metrics: Arc::new(PipelineMetrics::default()),
        })
    }

    pub fn authenticator(&self) -> &Arc<TokenAuthenticator> {
        &self.authenticator
    }

    pub fn block_list(&self) -> &Arc<BlockList> {
        &self.block_list
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn events(&self) -> &SecurityEventLog {
        &self.events
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_routes.contains(path)
    }

    /// Deny an identity for the rest of the process lifetime
    pub fn block_identity(&self, identity: &ClientIdentity, reason: &str) -> bool {
        self.block_list.block(identity, reason)
    }

    /// Screen one request. On success the returned request carries the
    /// [`ClientIdentity`], and where applicable the [`AuthenticatedSubject`]
    /// and [`ScreenedUpload`], as extensions.
    ///
    /// Stages run on a separate task so a panic inside one is caught here
    /// and reported as an internal failure.
    pub async fn admit(
        self: &Arc<Self>,
        req: Request,
        peer: Option<SocketAddr>,
    ) -> std::result::Result<Request, Rejection> {
        self.metrics.record_request();

        let info = RequestInfo {
            identity: self.resolver.resolve(req.headers(), peer),
            method: req.method().clone(),
            path: req.uri().path().to_string(),
        };

        let pipeline = Arc::clone(self);
        let task_info = info.clone();
        let outcome = match tokio::spawn(async move { pipeline.run_stages(task_info, req).await })
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, path = %info.path, "security pipeline stage failed");
                Err(self
                    .reject(
                        &info,
                        Rejection::internal(Stage::Unknown),
                        json!({ "error": "stage task failed" }),
                    )
                    .await)
            }
        };

        match &outcome {
            Ok(_) => self.metrics.record_admitted(),
            Err(rejection) => self.metrics.record_rejection(&rejection.kind),
        }
        outcome
    }

    async fn run_stages(
        &self,
        info: RequestInfo,
        req: Request,
    ) -> std::result::Result<Request, Rejection> {
        let (mut parts, mut body) = req.into_parts();
        parts.extensions.insert(info.identity.clone());

        if self.block_list.is_blocked(&info.identity) {
            let rejection = Rejection::new(
                Stage::BlockCheck,
                RejectionKind::Blocked,
                EventType::BlockedIpAccess,
            );
            return Err(self.reject(&info, rejection, json!({})).await);
        }

        if let RateLimitResult::Limited { retry_after } = self.rate_limiter.check(&info.identity) {
            let rejection = Rejection::new(
                Stage::RateLimit,
                RejectionKind::RateLimited { retry_after },
                EventType::RateLimitExceeded,
            );
            return Err(self
                .reject(&info, rejection, json!({ "retry_after": retry_after }))
                .await);
        }

        if !info.method.is_safe() {
            let is_upload = info.method == Method::POST && info.path == self.upload_route;
            let bytes = self.read_body(&info, &parts, body, is_upload).await?;
            let form = self.validate_input(&info, &parts, &bytes, is_upload).await?;

            if is_upload {
                let upload = self.check_upload(&info, form).await?;
                parts.extensions.insert(upload);
            }
            body = Body::from(bytes);
        }

        if !self.is_public(&info.path) {
            let subject = self.authenticate(&info, &parts).await?;
            parts.extensions.insert(subject);
        }

        Ok(Request::from_parts(parts, body))
    }

    /// Buffer the body up to the route's ceiling
    async fn read_body(
        &self,
        info: &RequestInfo,
        parts: &Parts,
        body: Body,
        is_upload: bool,
    ) -> std::result::Result<Bytes, Rejection> {
        let limit = if is_upload {
            (self.upload_policy.max_file_size() as usize).saturating_add(UPLOAD_ENVELOPE_BYTES)
        } else {
            self.max_request_size
        };

        let declared = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        if let Some(size) = declared {
            if size > limit as u64 {
                return Err(self.body_too_large(info, is_upload, Some(size), limit).await);
            }
        }

        match axum::body::to_bytes(body, limit).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                tracing::debug!(error = %e, path = %info.path, "request body not readable within limit");
                Err(self.body_too_large(info, is_upload, declared, limit).await)
            }
        }
    }

    async fn body_too_large(
        &self,
        info: &RequestInfo,
        is_upload: bool,
        size: Option<u64>,
        limit: usize,
    ) -> Rejection {
        let rejection = if is_upload {
            Rejection::new(
                Stage::UploadCheck,
                RejectionKind::UploadRejected { too_large: true },
                EventType::FileTooLarge,
            )
        } else {
            Rejection::new(
                Stage::InputValidation,
                RejectionKind::InvalidInput,
                EventType::RequestTooLarge,
            )
        };
        self.reject(info, rejection, json!({ "size": size, "limit": limit }))
            .await
    }

    /// Body and query parameters against the signature table. Multipart
    /// bodies are parsed here; their file parts are left to the upload
    /// policy on the upload route.
    async fn validate_input(
        &self,
        info: &RequestInfo,
        parts: &Parts,
        bytes: &Bytes,
        is_upload: bool,
    ) -> std::result::Result<Option<MultipartForm>, Rejection> {
        let mime = media_type(parts);

        let form = if mime == "multipart/form-data" {
            let form = self.parse_multipart(info, parts, bytes, is_upload).await?;
            self.check_form(info, &form, is_upload).await?;
            Some(form)
        } else {
            if !bytes.is_empty() {
                if let Err((violation, payload)) = self.check_body(&mime, bytes) {
                    return Err(self
                        .reject_input(info, EventType::MaliciousInput, &violation, json!({
                            "body_preview": preview(&payload, PREVIEW_CHARS),
                        }))
                        .await);
                }
            }
            None
        };

        if let Some(query) = parts.uri.query() {
            for (name, value) in parse_pairs(query) {
                if let Err(violation) = self.validator.check_str(&value) {
                    return Err(self
                        .reject_input(info, EventType::MaliciousQueryParam, &violation, json!({
                            "param": name,
                            "value": preview(&value, PREVIEW_CHARS),
                        }))
                        .await);
                }
            }
        }

        Ok(form)
    }

    /// Returns the violation and the offending text. The decoded body as a
    /// whole is held to the string length cap before any structural walk.
    fn check_body(&self, mime: &str, bytes: &Bytes) -> std::result::Result<(), (Violation, String)> {
        let text = decode_lossy(bytes);
        if let Err(violation) = self.validator.check_length(&text) {
            return Err((violation, text));
        }

        if mime == "application/json" || mime.ends_with("+json") {
            if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
                return self.validator.check_value(&value).map_err(|v| (v, text));
            }
        }

        if mime == "application/x-www-form-urlencoded" {
            for (name, value) in parse_pairs(&text) {
                for part in [name, value] {
                    if let Err(violation) = self.validator.check_str(&part) {
                        return Err((violation, part));
                    }
                }
            }
            return Ok(());
        }

        self.validator.check_str(&text).map_err(|v| (v, text))
    }

    async fn check_form(
        &self,
        info: &RequestInfo,
        form: &MultipartForm,
        is_upload: bool,
    ) -> std::result::Result<(), Rejection> {
        for (name, value) in &form.text_fields {
            if let Err(violation) = self.validator.check_str(value) {
                let event_type = if name == UPLOAD_CATEGORIES_FIELD {
                    EventType::MaliciousCategories
                } else {
                    EventType::MaliciousInput
                };
                return Err(self
                    .reject_input(info, event_type, &violation, json!({
                        "field": name,
                        "body_preview": preview(value, PREVIEW_CHARS),
                    }))
                    .await);
            }
        }

        if !is_upload {
            for file in &form.files {
                let text = decode_lossy(&file.content);
                if let Err(violation) = self.validator.check_str(&text) {
                    return Err(self
                        .reject_input(info, EventType::MaliciousInput, &violation, json!({
                            "field": file.field,
                            "body_preview": preview(&text, PREVIEW_CHARS),
                        }))
                        .await);
                }
            }
        }

        Ok(())
    }

    async fn parse_multipart(
        &self,
        info: &RequestInfo,
        parts: &Parts,
        bytes: &Bytes,
        is_upload: bool,
    ) -> std::result::Result<MultipartForm, Rejection> {
        let mut request = Request::new(Body::from(bytes.clone()));
        *request.headers_mut() = parts.headers.clone();
        *request.extensions_mut() = parts.extensions.clone();

        let mut multipart = match Multipart::from_request(request, &()).await {
            Ok(multipart) => multipart,
            Err(e) => return Err(self.malformed(info, is_upload, e.body_text()).await),
        };

        let mut form = MultipartForm::default();
        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => return Err(self.malformed(info, is_upload, e.body_text()).await),
            };

            let name = field.name().unwrap_or_default().to_string();
            let filename = field.file_name().map(str::to_string);
            let content = match field.bytes().await {
                Ok(content) => content,
                Err(e) => return Err(self.malformed(info, is_upload, e.body_text()).await),
            };

            match filename {
                Some(filename) => form.files.push(FilePart {
                    field: name,
                    filename,
                    content,
                }),
                None => form.text_fields.push((name, decode_lossy(&content))),
            }
        }

        Ok(form)
    }

    /// Unparseable multipart body; only the upload route calls it an upload
    async fn malformed(&self, info: &RequestInfo, is_upload: bool, reason: String) -> Rejection {
        let event_type = if is_upload {
            EventType::MalformedUpload
        } else {
            EventType::MaliciousInput
        };
        let rejection = Rejection::new(Stage::InputValidation, RejectionKind::InvalidInput, event_type);
        self.reject(info, rejection, json!({ "error": reason })).await
    }

    /// Upload policy over the `file` part of the parsed form
    async fn check_upload(
        &self,
        info: &RequestInfo,
        form: Option<MultipartForm>,
    ) -> std::result::Result<ScreenedUpload, Rejection> {
        let missing_file = || {
            Rejection::new(
                Stage::UploadCheck,
                RejectionKind::UploadRejected { too_large: false },
                EventType::MalformedUpload,
            )
        };

        let Some(mut form) = form else {
            return Err(self
                .reject(info, missing_file(), json!({ "error": "expected multipart/form-data" }))
                .await);
        };
        let categories = form.text(UPLOAD_CATEGORIES_FIELD).map(str::to_string);
        let Some(file) = form.take_file(UPLOAD_FILE_FIELD) else {
            return Err(self
                .reject(info, missing_file(), json!({ "error": "missing file field" }))
                .await);
        };

        let sanitized = sanitize_filename(&file.filename);
        if sanitized.changed {
            self.events
                .record_default(
                    EventType::SuspiciousFilename,
                    &info.identity,
                    None,
                    json!({
                        "path": info.path,
                        "original_filename": file.filename,
                        "sanitized_filename": sanitized.name,
                    }),
                )
                .await;
        }

        let size = file.content.len() as u64;
        match self
            .upload_policy
            .check_sanitized(&sanitized.name, size, &file.content)
        {
            Ok(checked) => Ok(ScreenedUpload {
                filename: checked.filename,
                original_filename: file.filename,
                size,
                content: file.content,
                categories,
            }),
            Err(violation) => {
                let (event_type, too_large) = match &violation {
                    UploadViolation::InvalidFileType { .. } => (EventType::InvalidFileType, false),
                    UploadViolation::TooLarge { .. } => (EventType::FileTooLarge, true),
                    UploadViolation::MaliciousContent(_) => {
                        (EventType::MaliciousFileContent, false)
                    }
                };
                let rejection = Rejection::new(
                    Stage::UploadCheck,
                    RejectionKind::UploadRejected { too_large },
                    event_type,
                );
                Err(self
                    .reject(info, rejection, json!({
                        "filename": sanitized.name,
                        "size": size,
                        "reason": violation.to_string(),
                    }))
                    .await)
            }
        }
    }

    async fn authenticate(
        &self,
        info: &RequestInfo,
        parts: &Parts,
    ) -> std::result::Result<AuthenticatedSubject, Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token);

        let Some(token) = token else {
            let rejection = Rejection::new(
                Stage::Authentication,
                RejectionKind::Unauthenticated,
                EventType::MissingAuth,
            );
            return Err(self.reject(info, rejection, json!({})).await);
        };

        match self.authenticator.verify(token) {
            Ok(claims) => Ok(AuthenticatedSubject(claims.sub)),
            Err(e) => {
                let event_type = match e {
                    TokenError::Expired => EventType::ExpiredToken,
                    TokenError::Invalid(_) => EventType::InvalidToken,
                };
                let rejection = Rejection::new(
                    Stage::Authentication,
                    RejectionKind::Unauthenticated,
                    event_type,
                );
                Err(self
                    .reject(info, rejection, json!({ "reason": e.to_string() }))
                    .await)
            }
        }
    }

    async fn reject_input(
        &self,
        info: &RequestInfo,
        event_type: EventType,
        violation: &Violation,
        details: Value,
    ) -> Rejection {
        let mut details = details;
        if let Value::Object(map) = &mut details {
            map.insert("violation".to_string(), json!(violation.to_string()));
        }
        let rejection = Rejection::new(Stage::InputValidation, RejectionKind::InvalidInput, event_type);
        self.reject(info, rejection, details).await
    }

    /// Record the single event for a rejection and hand it back
    async fn reject(&self, info: &RequestInfo, rejection: Rejection, details: Value) -> Rejection {
        let mut details = details;
        if let Value::Object(map) = &mut details {
            map.insert("path".to_string(), json!(info.path));
            map.insert("method".to_string(), json!(info.method.as_str()));
            map.insert("stage".to_string(), json!(rejection.stage));
        }
        self.events
            .record_default(rejection.event_type, &info.identity, None, details)
            .await;
        rejection
    }
}

/// Lower-cased media type without parameters
fn media_type(parts: &Parts) -> String {
    parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Split `a=1&b=2` pairs, decoding each side once. Undecodable input is
/// kept as written.
pub fn parse_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(name), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}
