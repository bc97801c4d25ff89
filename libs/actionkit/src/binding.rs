//! Binding catalog: where a handler argument comes from.
//!
//! A [`BindingSpec`] pairs a [`BindingSource`] with the static type of the
//! argument and, optionally, a default value. Two specs are the *same*
//! synthesized input when their [`IdentityKey`]s are equal: same source kind,
//! same type, and same discriminator name compared case-insensitively.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use http::{request::Parts, HeaderMap, Method, Uri};
use serde::de::DeserializeOwned;

use crate::services::ServiceProvider;
use crate::value::{Value, ValueType};

/// Field-less discriminant of [`BindingSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Service,
    RouteParameter,
    QueryParameter,
    Header,
    Body,
    Form,
    FormValue,
    CustomResolver,
    PreviousHandlerResult,
    AmbientContext,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Values available from the current request without a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AmbientKind {
    /// `http::Method`
    Method,
    /// `http::Uri`
    Uri,
    /// `http::HeaderMap`
    Headers,
    /// [`RequestContext`]
    Request,
    /// [`ServiceProvider`]
    Services,
}

impl AmbientKind {
    /// The static type a binding of this kind carries.
    pub fn value_type(&self) -> ValueType {
        match self {
            AmbientKind::Method => ValueType::of::<Method>(),
            AmbientKind::Uri => ValueType::of::<Uri>(),
            AmbientKind::Headers => ValueType::of::<HeaderMap>(),
            AmbientKind::Request => ValueType::of::<RequestContext>(),
            AmbientKind::Services => ValueType::of::<ServiceProvider>(),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            AmbientKind::Method => "method",
            AmbientKind::Uri => "uri",
            AmbientKind::Headers => "headers",
            AmbientKind::Request => "request",
            AmbientKind::Services => "services",
        }
    }
}

/// Snapshot of the request handed out for [`AmbientKind::Request`].
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub route_values: HashMap<String, String>,
}

/// What a custom resolver sees when producing an argument.
pub struct ResolveContext<'a> {
    pub parts: &'a Parts,
    pub route_values: &'a HashMap<String, String>,
    pub services: &'a ServiceProvider,
}

/// User-supplied argument resolver, instantiated through `Default`.
#[async_trait]
pub trait ValueResolver: Default + Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<Self::Output, String>;
}

#[async_trait]
pub(crate) trait ErasedResolver: Send + Sync {
    async fn resolve_value(&self, ctx: &ResolveContext<'_>) -> Result<Value, String>;
}

struct ResolverAdapter<R>(R);

#[async_trait]
impl<R: ValueResolver> ErasedResolver for ResolverAdapter<R> {
    async fn resolve_value(&self, ctx: &ResolveContext<'_>) -> Result<Value, String> {
        let out = self.0.resolve(ctx).await?;
        Ok(Arc::new(out) as Value)
    }
}

/// Handle to a custom resolver type.
#[derive(Clone)]
pub struct ResolverRef {
    id: TypeId,
    name: &'static str,
    resolver: Arc<dyn ErasedResolver>,
}

impl ResolverRef {
    fn of<R: ValueResolver>() -> Self {
        Self {
            id: TypeId::of::<R>(),
            name: type_name::<R>(),
            resolver: Arc::new(ResolverAdapter(R::default())),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    pub fn type_name(&self) -> &'static str {
        self.name
    }

    pub(crate) async fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<Value, String> {
        self.resolver.resolve_value(ctx).await
    }
}

impl fmt::Debug for ResolverRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl PartialEq for ResolverRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Where an argument comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingSource {
    Service,
    RouteParameter { name: String },
    QueryParameter { name: String },
    Header { name: String },
    Body,
    Form,
    FormValue { key: String },
    CustomResolver { resolver: ResolverRef },
    PreviousHandlerResult,
    AmbientContext { kind: AmbientKind },
}

impl BindingSource {
    pub fn kind(&self) -> BindingKind {
        match self {
            BindingSource::Service => BindingKind::Service,
            BindingSource::RouteParameter { .. } => BindingKind::RouteParameter,
            BindingSource::QueryParameter { .. } => BindingKind::QueryParameter,
            BindingSource::Header { .. } => BindingKind::Header,
            BindingSource::Body => BindingKind::Body,
            BindingSource::Form => BindingKind::Form,
            BindingSource::FormValue { .. } => BindingKind::FormValue,
            BindingSource::CustomResolver { .. } => BindingKind::CustomResolver,
            BindingSource::PreviousHandlerResult => BindingKind::PreviousHandlerResult,
            BindingSource::AmbientContext { .. } => BindingKind::AmbientContext,
        }
    }

    /// Name or key as the caller spelled it.
    pub fn name(&self) -> Option<&str> {
        match self {
            BindingSource::RouteParameter { name }
            | BindingSource::QueryParameter { name }
            | BindingSource::Header { name } => Some(name),
            BindingSource::FormValue { key } => Some(key),
            BindingSource::CustomResolver { resolver } => Some(resolver.type_name()),
            BindingSource::AmbientContext { kind } => Some(kind.as_str()),
            _ => None,
        }
    }
}

/// How the host turns raw request input into a value of the binding's type.
#[derive(Clone, Copy)]
pub(crate) enum Decoder {
    Text(fn(&str) -> Result<Value, String>),
    Bytes(fn(&[u8]) -> Result<Value, String>),
    Service(fn(&ServiceProvider) -> Option<Value>),
    Unused,
}

/// Deduplication identity of a binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub kind: BindingKind,
    pub type_id: TypeId,
    pub discriminator: String,
}

/// Declarative description of one handler argument.
#[derive(Clone)]
pub struct BindingSpec {
    source: BindingSource,
    value_type: ValueType,
    default: Option<Value>,
    pub(crate) decoder: Decoder,
}

impl BindingSpec {
    fn new(source: BindingSource, value_type: ValueType, decoder: Decoder) -> Self {
        Self {
            source,
            value_type,
            default: None,
            decoder,
        }
    }

    /// An `Arc<S>` looked up from the host's service provider.
    pub fn service<S: Any + Send + Sync>() -> Self {
        Self::new(
            BindingSource::Service,
            ValueType::of::<Arc<S>>(),
            Decoder::Service(lookup_service::<S>),
        )
    }

    pub fn route<T>(name: impl Into<String>) -> Self
    where
        T: FromStr + Send + Sync + 'static,
        T::Err: fmt::Display,
    {
        Self::new(
            BindingSource::RouteParameter { name: name.into() },
            ValueType::of::<T>(),
            Decoder::Text(decode_text::<T>),
        )
    }

    pub fn query<T>(name: impl Into<String>) -> Self
    where
        T: FromStr + Send + Sync + 'static,
        T::Err: fmt::Display,
    {
        Self::new(
            BindingSource::QueryParameter { name: name.into() },
            ValueType::of::<T>(),
            Decoder::Text(decode_text::<T>),
        )
    }

    pub fn header<T>(name: impl Into<String>) -> Self
    where
        T: FromStr + Send + Sync + 'static,
        T::Err: fmt::Display,
    {
        Self::new(
            BindingSource::Header { name: name.into() },
            ValueType::of::<T>(),
            Decoder::Text(decode_text::<T>),
        )
    }

    /// JSON request body.
    pub fn body<T: DeserializeOwned + Send + Sync + 'static>() -> Self {
        Self::new(
            BindingSource::Body,
            ValueType::of::<T>(),
            Decoder::Bytes(decode_json::<T>),
        )
    }

    /// Whole url-encoded form body.
    pub fn form<T: DeserializeOwned + Send + Sync + 'static>() -> Self {
        Self::new(
            BindingSource::Form,
            ValueType::of::<T>(),
            Decoder::Bytes(decode_form::<T>),
        )
    }

    /// A single field of a url-encoded form body.
    pub fn form_value<T>(key: impl Into<String>) -> Self
    where
        T: FromStr + Send + Sync + 'static,
        T::Err: fmt::Display,
    {
        Self::new(
            BindingSource::FormValue { key: key.into() },
            ValueType::of::<T>(),
            Decoder::Text(decode_text::<T>),
        )
    }

    pub fn custom<R: ValueResolver>() -> Self {
        Self::new(
            BindingSource::CustomResolver {
                resolver: ResolverRef::of::<R>(),
            },
            ValueType::of::<R::Output>(),
            Decoder::Unused,
        )
    }

    /// The previous handler step's result.
    pub fn previous<T: Any + Send + Sync>() -> Self {
        Self::new(
            BindingSource::PreviousHandlerResult,
            ValueType::of::<T>(),
            Decoder::Unused,
        )
    }

    pub fn ambient(kind: AmbientKind) -> Self {
        Self::new(
            BindingSource::AmbientContext { kind },
            kind.value_type(),
            Decoder::Unused,
        )
    }

    /// Makes the synthesized parameter optional, falling back to `value`.
    pub fn with_default<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.default = Some(Arc::new(value));
        self
    }

    pub fn source(&self) -> &BindingSource {
        &self.source
    }

    pub fn kind(&self) -> BindingKind {
        self.source.kind()
    }

    pub fn name(&self) -> Option<&str> {
        self.source.name()
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Bindings that occupy a slot in the synthesized parameter list.
    pub fn is_method_level(&self) -> bool {
        !matches!(
            self.kind(),
            BindingKind::PreviousHandlerResult | BindingKind::AmbientContext
        )
    }

    pub fn identity(&self) -> IdentityKey {
        IdentityKey {
            kind: self.kind(),
            type_id: self.value_type.id(),
            discriminator: self.name().unwrap_or_default().to_lowercase(),
        }
    }
}

impl PartialEq for BindingSpec {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for BindingSpec {}

impl Hash for BindingSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Debug for BindingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingSpec")
            .field("source", &self.source)
            .field("value_type", &self.value_type)
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

impl fmt::Display for BindingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>", self.kind(), self.value_type.short_name())?;
        match &self.source {
            BindingSource::RouteParameter { name }
            | BindingSource::QueryParameter { name }
            | BindingSource::Header { name } => write!(f, "(\"{name}\")"),
            BindingSource::FormValue { key } => write!(f, "(\"{key}\")"),
            BindingSource::AmbientContext { kind } => write!(f, "({kind:?})"),
            _ => Ok(()),
        }
    }
}

fn decode_text<T>(raw: &str) -> Result<Value, String>
where
    T: FromStr + Send + Sync + 'static,
    T::Err: fmt::Display,
{
    raw.parse::<T>()
        .map(|v| Arc::new(v) as Value)
        .map_err(|e| e.to_string())
}

fn decode_json<T: DeserializeOwned + Send + Sync + 'static>(raw: &[u8]) -> Result<Value, String> {
    serde_json::from_slice::<T>(raw)
        .map(|v| Arc::new(v) as Value)
        .map_err(|e| e.to_string())
}

fn decode_form<T: DeserializeOwned + Send + Sync + 'static>(raw: &[u8]) -> Result<Value, String> {
    serde_urlencoded::from_bytes::<T>(raw)
        .map(|v| Arc::new(v) as Value)
        .map_err(|e| e.to_string())
}

fn lookup_service<S: Any + Send + Sync>(services: &ServiceProvider) -> Option<Value> {
    services.get_value::<S>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct TenantResolver;

    #[async_trait]
    impl ValueResolver for TenantResolver {
        type Output = String;

        async fn resolve(&self, _ctx: &ResolveContext<'_>) -> Result<String, String> {
            Ok("acme".to_string())
        }
    }

    #[test]
    fn identity_ignores_name_casing() {
        let a = BindingSpec::route::<i32>("userId");
        let b = BindingSpec::route::<i32>("USERID");
        assert_eq!(a, b);
        assert_eq!(a.identity().discriminator, "userid");
        // original spelling is preserved
        assert_eq!(a.name(), Some("userId"));
        assert_eq!(b.name(), Some("USERID"));
    }

    #[test]
    fn identity_distinguishes_type_and_kind() {
        let route = BindingSpec::route::<i32>("id");
        assert_ne!(route, BindingSpec::route::<i64>("id"));
        assert_ne!(route, BindingSpec::query::<i32>("id"));
        assert_ne!(BindingSpec::body::<String>(), BindingSpec::form::<String>());
        assert_eq!(BindingSpec::body::<String>(), BindingSpec::body::<String>());
    }

    #[test]
    fn service_binding_carries_arc_type() {
        struct Repo;
        let spec = BindingSpec::service::<Repo>();
        assert_eq!(spec.value_type(), ValueType::of::<Arc<Repo>>());
        assert!(spec.is_method_level());
    }

    #[test]
    fn custom_resolver_identity_uses_type_name() {
        let a = BindingSpec::custom::<TenantResolver>();
        let b = BindingSpec::custom::<TenantResolver>();
        assert_eq!(a, b);
        assert!(a.identity().discriminator.ends_with("tenantresolver"));
        assert_eq!(a.value_type(), ValueType::of::<String>());
    }

    #[test]
    fn ambient_and_previous_are_not_method_level() {
        assert!(!BindingSpec::ambient(AmbientKind::Headers).is_method_level());
        assert!(!BindingSpec::previous::<u8>().is_method_level());
        assert_eq!(
            BindingSpec::ambient(AmbientKind::Headers).value_type(),
            ValueType::of::<HeaderMap>()
        );
    }

    #[test]
    fn text_decoder_parses_declared_type() {
        let spec = BindingSpec::query::<u32>("page");
        let Decoder::Text(decode) = spec.decoder else {
            panic!("query bindings decode text");
        };
        let value = decode("12").unwrap();
        assert_eq!(value.downcast_ref::<u32>(), Some(&12));
        assert!(decode("twelve").is_err());
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(
            BindingSpec::route::<i32>("userId").to_string(),
            "RouteParameter<i32>(\"userId\")"
        );
        assert_eq!(BindingSpec::body::<String>().to_string(), "Body<String>");
    }
}
