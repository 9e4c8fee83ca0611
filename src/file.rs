//! The `File` resource.
//!
//! Creating a `File` opens the file at `path`, creating it if missing and
//! truncating it otherwise. Nothing else is managed: reads, diffs and deletes
//! use the inference defaults, so removing the resource leaves the file on
//! disk.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::infer::{Context, Resource};
use crate::schema::{Attribute, Schema};
use crate::types::{CreateError, CreateResult, Created};

/// Status reported in [`FileState::result`] after every real create.
///
/// It is reported whether or not the create succeeded; failures are only
/// visible through the returned error.
pub const PLACEHOLDER_RESULT: &str = "not working";

/// Controls the `linux:index:File` resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct File;

/// Inputs of a `File`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileArgs {
    /// Where the file is created.
    pub path: String,
}

/// State of a created `File`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileState {
    /// The inputs the file was created with.
    #[serde(flatten)]
    pub args: FileArgs,
    /// Status of the create.
    #[serde(default)]
    pub result: String,
}

#[async_trait]
impl Resource for File {
    type Args = FileArgs;
    type State = FileState;

    const TOKEN: &'static str = "linux:index:File";

    fn schema() -> Schema {
        Schema::v0()
            .with_description("A file on the provider's host.")
            .with_attribute(
                "path",
                Attribute::required_string()
                    .with_description("Filesystem location of the file.")
                    .with_force_new(),
            )
            .with_attribute(
                "result",
                Attribute::computed_string().with_description("Status of the create."),
            )
    }

    async fn create(
        &self,
        ctx: &Context,
        name: &str,
        args: FileArgs,
        preview: bool,
    ) -> CreateResult<FileState> {
        let mut state = FileState {
            args,
            result: String::new(),
        };
        if preview {
            return Ok(Created::new(name, state));
        }

        let created = create_file(&state.args.path).await;
        state.result = PLACEHOLDER_RESULT.to_string();

        match created {
            Ok(()) => {
                debug!(token = ctx.token(), path = %state.args.path, "file created");
                Ok(Created::new(name, state))
            },
            Err(err) => {
                warn!(
                    token = ctx.token(),
                    path = %state.args.path,
                    error = %err,
                    "file create failed"
                );
                Err(CreateError::partial(name, state, err))
            },
        }
    }
}

/// Create `path`, truncating it if it already exists.
async fn create_file(path: &str) -> Result<(), ProviderError> {
    tokio::fs::File::create(path).await?;
    Ok(())
}
