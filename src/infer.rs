//! Resource inference.
//!
//! A provider built from typed resources instead of raw JSON. Each resource
//! implements [`Resource`]: it names its argument and state types, annotates
//! them with a [`Schema`], and implements `create`. Everything else in the
//! lifecycle (check, diff, update, read, delete) has a default here, so a
//! resource only overrides what it actually does differently.
//!
//! [`InferredProvider`] registers resources by type token and implements
//! [`ProviderService`] on top of them, so it can be handed straight to
//! [`serve`](crate::serve).
//!
//! # Example
//!
//! ```ignore
//! use linux_provider::infer::InferredProvider;
//! use linux_provider::file::File;
//!
//! let provider = InferredProvider::builder("linux", linux_provider::VERSION)
//!     .resource(File)
//!     .build();
//! linux_provider::serve(provider).await?;
//! ```

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info_span, warn, Instrument, Span};

use crate::error::ProviderError;
use crate::schema::{Diagnostic, ProviderSchema, Schema};
use crate::server::ProviderService;
use crate::types::{
    AttributeChange, CreateResult, PlanResult, ProviderMetadata, ServerCapabilities,
};
use crate::validation;

/// Per-call context handed to resource methods.
#[derive(Debug, Clone)]
pub struct Context {
    token: &'static str,
    name: String,
    span: Span,
}

impl Context {
    /// Create a context for an operation on the resource `name` of type `token`.
    pub fn new(token: &'static str, name: impl Into<String>) -> Self {
        let name = name.into();
        let span = info_span!("resource", token = token, name = %name);
        Self { token, name, span }
    }

    /// The resource type token.
    pub fn token(&self) -> &'static str {
        self.token
    }

    /// The logical name (or id) of the resource being operated on.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The tracing span all work for this call runs in.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

/// Typed inputs after Check, plus any diagnostics Check produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Checked<A> {
    /// The decoded inputs, or `None` if Check failed.
    pub inputs: Option<A>,
    /// Errors and warnings about the raw inputs.
    pub diagnostics: Vec<Diagnostic>,
}

impl<A> Checked<A> {
    /// Turn a failed check into a validation error.
    pub fn into_result(self) -> Result<A, ProviderError> {
        match self.inputs {
            Some(inputs) => Ok(inputs),
            None => Err(ProviderError::Validation(
                self.diagnostics
                    .iter()
                    .filter(|d| d.is_error())
                    .map(|d| match &d.attribute {
                        Some(attr) => format!("{} ({})", d.summary, attr),
                        None => d.summary.clone(),
                    })
                    .collect::<Vec<_>>()
                    .join("; "),
            )),
        }
    }
}

/// The result of comparing old and new inputs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Diff {
    /// Attributes whose values differ.
    pub changes: Vec<AttributeChange>,
    /// Whether the change can only be applied by replacing the resource.
    pub replace: bool,
}

impl Diff {
    /// Whether the inputs are unchanged.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// A resource type whose schema and wiring are derived from its Rust types.
///
/// Only `create` is mandatory. The other methods default to:
///
/// - `check`: validate against [`Resource::schema`] and decode into `Args`
/// - `diff`: attribute-by-attribute comparison; replacement when the
///   resource is not [`UPDATABLE`](Resource::UPDATABLE) or a force-new
///   attribute changed
/// - `update`: unimplemented
/// - `read`: return the recorded state unchanged
/// - `delete`: no-op
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// The user-supplied inputs.
    type Args: Serialize + DeserializeOwned + Clone + PartialEq + fmt::Debug + Send + Sync;
    /// The state reported after creation.
    type State: Serialize + DeserializeOwned + fmt::Debug + Send + Sync;

    /// The type token, `<provider>:<module>:<Type>`.
    const TOKEN: &'static str;

    /// Whether [`Resource::update`] is implemented.
    const UPDATABLE: bool = false;

    /// Describe the resource's attributes.
    fn schema() -> Schema;

    /// Create the resource. With `preview` set, compute the prospective state
    /// without side effects.
    async fn create(
        &self,
        ctx: &Context,
        name: &str,
        args: Self::Args,
        preview: bool,
    ) -> CreateResult<Self::State>;

    /// Validate raw inputs and decode them.
    async fn check(&self, ctx: &Context, inputs: Value) -> Checked<Self::Args> {
        let _ = ctx;
        check_inputs::<Self::Args>(&Self::schema(), inputs)
    }

    /// Compare old and new inputs.
    async fn diff(
        &self,
        ctx: &Context,
        olds: &Self::Args,
        news: &Self::Args,
    ) -> Result<Diff, ProviderError> {
        let _ = ctx;
        diff_inputs(&Self::schema(), Self::UPDATABLE, olds, news)
    }

    /// Update the resource in place.
    async fn update(
        &self,
        ctx: &Context,
        id: &str,
        olds: Self::State,
        news: Self::Args,
        preview: bool,
    ) -> Result<Self::State, ProviderError> {
        let _ = (ctx, id, olds, news, preview);
        Err(ProviderError::Unimplemented(format!(
            "{} does not support in-place updates",
            Self::TOKEN
        )))
    }

    /// Refresh the recorded state from the real world.
    async fn read(
        &self,
        ctx: &Context,
        id: &str,
        state: Self::State,
    ) -> Result<Self::State, ProviderError> {
        let _ = (ctx, id);
        Ok(state)
    }

    /// Delete the resource.
    async fn delete(
        &self,
        ctx: &Context,
        id: &str,
        state: Self::State,
    ) -> Result<(), ProviderError> {
        let _ = (ctx, id, state);
        Ok(())
    }
}

/// Default Check: schema validation followed by decoding into `A`.
pub fn check_inputs<A: DeserializeOwned>(schema: &Schema, inputs: Value) -> Checked<A> {
    let mut diagnostics = validation::validate(schema, &inputs);
    if diagnostics.iter().any(Diagnostic::is_error) {
        return Checked {
            inputs: None,
            diagnostics,
        };
    }

    let inputs = if inputs.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        inputs
    };
    match serde_json::from_value(inputs) {
        Ok(args) => Checked {
            inputs: Some(args),
            diagnostics,
        },
        Err(err) => {
            diagnostics.push(Diagnostic::error("Invalid inputs").with_detail(err.to_string()));
            Checked {
                inputs: None,
                diagnostics,
            }
        },
    }
}

/// Default Diff: compare every input attribute of `schema` between `olds`
/// and `news`.
pub fn diff_inputs<A: Serialize>(
    schema: &Schema,
    updatable: bool,
    olds: &A,
    news: &A,
) -> Result<Diff, ProviderError> {
    let olds = serde_json::to_value(olds)?;
    let news = serde_json::to_value(news)?;

    let mut diff = Diff::default();
    for name in schema.input_names() {
        let before = olds.get(name).filter(|v| !v.is_null());
        let after = news.get(name).filter(|v| !v.is_null());
        if before == after {
            continue;
        }

        let change = match (before, after) {
            (Some(b), Some(a)) => AttributeChange::modified(name, b.clone(), a.clone()),
            (None, Some(a)) => AttributeChange::added(name, a.clone()),
            (Some(b), None) => AttributeChange::removed(name, b.clone()),
            (None, None) => continue,
        };
        let force_new = schema
            .attributes
            .get(name)
            .is_some_and(|attr| attr.force_new);
        diff.replace |= force_new || !updatable;
        diff.changes.push(change);
    }
    Ok(diff)
}

/// JSON-level view of a registered resource.
#[async_trait]
trait ErasedResource: Send + Sync {
    fn token(&self) -> &'static str;

    fn schema(&self) -> Schema;

    async fn check(&self, ctx: &Context, inputs: Value) -> Vec<Diagnostic>;

    async fn plan(
        &self,
        ctx: &Context,
        prior_state: Option<Value>,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError>;

    async fn create(&self, ctx: &Context, planned_state: Value) -> CreateResult;

    async fn read(&self, ctx: &Context, current_state: Value) -> Result<Value, ProviderError>;

    async fn update(
        &self,
        ctx: &Context,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    async fn delete(&self, ctx: &Context, current_state: Value) -> Result<(), ProviderError>;
}

impl fmt::Debug for dyn ErasedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedResource")
            .field("token", &self.token())
            .finish()
    }
}

/// Adapts a typed [`Resource`] to [`ErasedResource`].
struct Inferred<R: Resource>(R);

impl<R: Resource> Inferred<R> {
    async fn checked_args(&self, ctx: &Context, inputs: Value) -> Result<R::Args, ProviderError> {
        self.0.check(ctx, inputs).await.into_result()
    }

    async fn preview_state(&self, ctx: &Context, args: R::Args) -> Result<Value, ProviderError> {
        match self.0.create(ctx, ctx.name(), args, true).await {
            Ok(created) => Ok(created.into_json()?.state),
            Err(err) => Err(err.error),
        }
    }
}

#[async_trait]
impl<R: Resource> ErasedResource for Inferred<R> {
    fn token(&self) -> &'static str {
        R::TOKEN
    }

    fn schema(&self) -> Schema {
        R::schema()
    }

    async fn check(&self, ctx: &Context, inputs: Value) -> Vec<Diagnostic> {
        self.0.check(ctx, inputs).await.diagnostics
    }

    async fn plan(
        &self,
        ctx: &Context,
        prior_state: Option<Value>,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        if proposed_state.is_null() {
            let changes = prior_state
                .as_ref()
                .and_then(Value::as_object)
                .map(|prior| {
                    prior
                        .iter()
                        .map(|(k, v)| AttributeChange::removed(k.as_str(), v.clone()))
                        .collect()
                })
                .unwrap_or_default();
            return Ok(PlanResult::with_changes(Value::Null, changes, false));
        }

        let news = self.checked_args(ctx, proposed_state).await?;

        let Some(prior_state) = prior_state else {
            let planned = self.preview_state(ctx, news).await?;
            let changes = planned
                .as_object()
                .map(|planned| {
                    planned
                        .iter()
                        .filter(|(_, v)| !v.is_null())
                        .map(|(k, v)| AttributeChange::added(k.as_str(), v.clone()))
                        .collect()
                })
                .unwrap_or_default();
            return Ok(PlanResult::with_changes(planned, changes, false));
        };

        let olds: R::Args = serde_json::from_value(prior_state.clone())?;
        let diff = self.0.diff(ctx, &olds, &news).await?;
        if diff.is_empty() {
            debug!("no changes");
            return Ok(PlanResult::no_change(prior_state));
        }

        let planned = if diff.replace {
            self.preview_state(ctx, news).await?
        } else {
            let olds: R::State = serde_json::from_value(prior_state)?;
            let state = self.0.update(ctx, ctx.name(), olds, news, true).await?;
            serde_json::to_value(state)?
        };
        Ok(PlanResult::with_changes(planned, diff.changes, diff.replace))
    }

    async fn create(&self, ctx: &Context, planned_state: Value) -> CreateResult {
        let args = self.checked_args(ctx, planned_state).await?;
        match self.0.create(ctx, ctx.name(), args, false).await {
            Ok(created) => Ok(created.into_json()?),
            Err(err) => Err(err.into_json()),
        }
    }

    async fn read(&self, ctx: &Context, current_state: Value) -> Result<Value, ProviderError> {
        let state: R::State = serde_json::from_value(current_state)?;
        let state = self.0.read(ctx, ctx.name(), state).await?;
        Ok(serde_json::to_value(state)?)
    }

    async fn update(
        &self,
        ctx: &Context,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let olds: R::State = serde_json::from_value(prior_state)?;
        let news = self.checked_args(ctx, planned_state).await?;
        let state = self.0.update(ctx, ctx.name(), olds, news, false).await?;
        Ok(serde_json::to_value(state)?)
    }

    async fn delete(&self, ctx: &Context, current_state: Value) -> Result<(), ProviderError> {
        let state: R::State = serde_json::from_value(current_state)?;
        self.0.delete(ctx, ctx.name(), state).await
    }
}

/// A provider assembled from typed resources.
#[derive(Debug)]
pub struct InferredProvider {
    name: String,
    version: String,
    config: Schema,
    resources: HashMap<&'static str, Box<dyn ErasedResource>>,
}

impl InferredProvider {
    /// Start building a provider with the given name and version.
    pub fn builder(name: impl Into<String>, version: impl Into<String>) -> InferredProviderBuilder {
        InferredProviderBuilder {
            provider: InferredProvider {
                name: name.into(),
                version: version.into(),
                config: Schema::v0(),
                resources: HashMap::new(),
            },
        }
    }

    fn resource(&self, resource_type: &str) -> Result<&dyn ErasedResource, ProviderError> {
        self.resources
            .get(resource_type)
            .map(|r| r.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }
}

/// Builder for [`InferredProvider`].
#[derive(Debug)]
pub struct InferredProviderBuilder {
    provider: InferredProvider,
}

impl InferredProviderBuilder {
    /// Register a resource type.
    ///
    /// Registering the same token twice keeps the later resource.
    pub fn resource<R: Resource>(mut self, resource: R) -> Self {
        if self
            .provider
            .resources
            .insert(R::TOKEN, Box::new(Inferred(resource)))
            .is_some()
        {
            warn!(token = R::TOKEN, "resource registered twice, keeping the latest");
        }
        self
    }

    /// Set the schema of the provider-level configuration.
    pub fn config_schema(mut self, schema: Schema) -> Self {
        self.provider.config = schema;
        self
    }

    /// Finish building.
    pub fn build(self) -> InferredProvider {
        self.provider
    }
}

#[async_trait]
impl ProviderService for InferredProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn metadata(&self) -> ProviderMetadata {
        let mut resources: Vec<String> = self.resources.keys().map(|t| t.to_string()).collect();
        resources.sort();
        ProviderMetadata {
            name: self.name.clone(),
            version: self.version.clone(),
            resources,
            // A null proposed state plans removal of every prior attribute.
            capabilities: ServerCapabilities { plan_destroy: true },
        }
    }

    fn schema(&self) -> ProviderSchema {
        self.resources.values().fold(
            ProviderSchema::new().with_provider_config(self.config.clone()),
            |schema, resource| schema.with_resource(resource.token(), resource.schema()),
        )
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validation::validate(&self.config, &config))
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let ctx = Context::new(resource.token(), "");
        Ok(resource
            .check(&ctx, config)
            .instrument(ctx.span().clone())
            .await)
    }

    async fn plan(
        &self,
        resource_type: &str,
        name: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let resource = self.resource(resource_type)?;
        let ctx = Context::new(resource.token(), name);
        resource
            .plan(&ctx, prior_state, proposed_state)
            .instrument(ctx.span().clone())
            .await
    }

    async fn create(&self, resource_type: &str, name: &str, planned_state: Value) -> CreateResult {
        let resource = self.resource(resource_type)?;
        let ctx = Context::new(resource.token(), name);
        resource
            .create(&ctx, planned_state)
            .instrument(ctx.span().clone())
            .await
    }

    async fn read(
        &self,
        resource_type: &str,
        id: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let ctx = Context::new(resource.token(), id);
        resource
            .read(&ctx, current_state)
            .instrument(ctx.span().clone())
            .await
    }

    async fn update(
        &self,
        resource_type: &str,
        id: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let ctx = Context::new(resource.token(), id);
        resource
            .update(&ctx, prior_state, planned_state)
            .instrument(ctx.span().clone())
            .await
    }

    async fn delete(
        &self,
        resource_type: &str,
        id: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        let resource = self.resource(resource_type)?;
        let ctx = Context::new(resource.token(), id);
        resource
            .delete(&ctx, current_state)
            .instrument(ctx.span().clone())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeFlags, AttributeType, DiagnosticSeverity};
    use crate::testing::{
        assert_plan_changes_attribute, assert_plan_creates, assert_plan_no_changes,
        assert_plan_replaces, assert_plan_updates_in_place,
    };
    use crate::types::Created;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct NoteArgs {
        title: String,
        #[serde(default)]
        pinned: Option<bool>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct NoteState {
        #[serde(flatten)]
        args: NoteArgs,
        #[serde(default)]
        words: i64,
    }

    struct Note;

    #[async_trait]
    impl Resource for Note {
        type Args = NoteArgs;
        type State = NoteState;

        const TOKEN: &'static str = "test:index:Note";
        const UPDATABLE: bool = true;

        fn schema() -> Schema {
            Schema::v0()
                .with_attribute("title", Attribute::required_string())
                .with_attribute("pinned", Attribute::optional_bool().with_force_new())
                .with_attribute(
                    "words",
                    Attribute::new(AttributeType::Int64, AttributeFlags::computed()),
                )
        }

        async fn create(
            &self,
            _ctx: &Context,
            name: &str,
            args: NoteArgs,
            preview: bool,
        ) -> CreateResult<NoteState> {
            let words = if preview {
                0
            } else {
                args.title.split_whitespace().count() as i64
            };
            Ok(Created::new(name, NoteState { args, words }))
        }

        async fn update(
            &self,
            _ctx: &Context,
            _id: &str,
            _olds: NoteState,
            news: NoteArgs,
            _preview: bool,
        ) -> Result<NoteState, ProviderError> {
            Ok(NoteState {
                words: news.title.split_whitespace().count() as i64,
                args: news,
            })
        }
    }

    fn provider() -> InferredProvider {
        InferredProvider::builder("test", "1.2.3").resource(Note).build()
    }

    #[test]
    fn test_check_inputs_decodes() {
        let checked: Checked<NoteArgs> =
            check_inputs(&Note::schema(), json!({"title": "hello", "extra": 1}));
        assert_eq!(checked.inputs.unwrap().title, "hello");
        assert_eq!(checked.diagnostics.len(), 1);
        assert_eq!(checked.diagnostics[0].severity, DiagnosticSeverity::Warning);
    }

    #[test]
    fn test_check_inputs_rejects_missing_required() {
        let checked: Checked<NoteArgs> = check_inputs(&Note::schema(), json!({}));
        assert!(checked.inputs.is_none());

        let err = checked.into_result().unwrap_err();
        assert!(matches!(err, ProviderError::Validation(ref msg) if msg.contains("title")));
    }

    #[test]
    fn test_diff_inputs() {
        let olds = NoteArgs {
            title: "a".to_string(),
            pinned: None,
        };
        let same = diff_inputs(&Note::schema(), true, &olds, &olds.clone()).unwrap();
        assert!(same.is_empty());

        let retitled = NoteArgs {
            title: "b".to_string(),
            pinned: None,
        };
        let diff = diff_inputs(&Note::schema(), true, &olds, &retitled).unwrap();
        assert_eq!(diff.changes.len(), 1);
        assert!(!diff.replace);

        let diff = diff_inputs(&Note::schema(), false, &olds, &retitled).unwrap();
        assert!(diff.replace);

        let pinned = NoteArgs {
            title: "a".to_string(),
            pinned: Some(true),
        };
        let diff = diff_inputs(&Note::schema(), true, &olds, &pinned).unwrap();
        assert!(diff.replace);
        assert_eq!(diff.changes[0], AttributeChange::added("pinned", json!(true)));
    }

    #[test]
    fn test_metadata_and_schema() {
        let provider = provider();
        let metadata = provider.metadata();
        assert_eq!(metadata.name, "test");
        assert_eq!(metadata.version, "1.2.3");
        assert_eq!(metadata.resources, vec!["test:index:Note".to_string()]);
        assert!(metadata.capabilities.plan_destroy);

        let schema = provider.schema();
        assert!(schema.resources["test:index:Note"]
            .attributes
            .contains_key("title"));
    }

    #[tokio::test]
    async fn test_unknown_resource() {
        let provider = provider();
        let err = provider
            .read("test:index:Missing", "x", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(_)));

        let err = provider
            .create("test:index:Missing", "x", json!({}))
            .await
            .unwrap_err();
        assert!(err.partial.is_none());
    }

    #[tokio::test]
    async fn test_plan_create_uses_preview() {
        let plan = provider()
            .plan("test:index:Note", "n", None, json!({"title": "two words"}), json!({}))
            .await
            .unwrap();
        assert_plan_creates(&plan);
        assert_eq!(plan.planned_state["words"], 0);
        assert_plan_changes_attribute(&plan, "title");
    }

    #[tokio::test]
    async fn test_plan_update_in_place() {
        let prior = json!({"title": "one", "words": 1});
        let plan = provider()
            .plan(
                "test:index:Note",
                "n",
                Some(prior),
                json!({"title": "one two three"}),
                json!({}),
            )
            .await
            .unwrap();
        assert_plan_updates_in_place(&plan);
        assert_eq!(plan.planned_state["words"], 3);
    }

    #[tokio::test]
    async fn test_plan_force_new_replaces() {
        let prior = json!({"title": "one", "words": 1});
        let plan = provider()
            .plan(
                "test:index:Note",
                "n",
                Some(prior),
                json!({"title": "one", "pinned": true}),
                json!({}),
            )
            .await
            .unwrap();
        assert_plan_replaces(&plan);
        assert_eq!(plan.planned_state["words"], 0);
    }

    #[tokio::test]
    async fn test_plan_no_changes_keeps_prior() {
        let prior = json!({"title": "one", "words": 1});
        let plan = provider()
            .plan("test:index:Note", "n", Some(prior.clone()), json!({"title": "one"}), json!({}))
            .await
            .unwrap();
        assert_plan_no_changes(&plan);
        assert_eq!(plan.planned_state, prior);
    }

    #[tokio::test]
    async fn test_plan_destroy() {
        let prior = json!({"title": "one", "words": 1});
        let plan = provider()
            .plan("test:index:Note", "n", Some(prior), Value::Null, Value::Null)
            .await
            .unwrap();
        assert!(plan.planned_state.is_null());
        assert_eq!(plan.changes.len(), 2);
        assert!(plan.changes.iter().all(|c| c.after.is_none()));
    }

    #[tokio::test]
    async fn test_default_read_and_delete() {
        let provider = provider();
        let state = json!({"title": "kept", "words": 1});
        let read = provider
            .read("test:index:Note", "n", state.clone())
            .await
            .unwrap();
        assert_eq!(read["title"], "kept");
        assert_eq!(read["words"], 1);

        provider
            .delete("test:index:Note", "n", state)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_configure_warns_on_unknown_keys() {
        let diagnostics = provider().configure(json!({"region": "x"})).await.unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert!(!diagnostics[0].is_error());
    }
}
