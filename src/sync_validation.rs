//! [`SyncValidationHook`]: intercepts incoming remote content before merge
//! (§4.9). Re-expresses the source's exception-based control flow as a
//! typed [`Decision`] (§9 Design Notes).

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::context::{CallContext, Deadline};
use crate::error::{CoreError, ErrorKind};
use crate::model::header::{SCHEMA_ACCOUNT, SCHEMA_GENESIS, SCHEMA_GROUP};
use crate::model::CoId;
use crate::runtime::CrdtRuntime;
use crate::schema_resolver::{Resolved, ResolveOptions, ReturnType, SchemaResolver};
use crate::time::Clock;

pub const DEFAULT_SCHEMA_WAIT: Duration = Duration::from_secs(5);

/// Outcome of validating one incoming message.
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    Allow,
    RejectWith(ErrorKind, String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// The header fields of an inbound message the hook needs — enough to
/// classify the target without requiring a fully materialised core.
#[derive(Clone, Debug)]
pub struct IncomingHeader {
    pub schema: Option<String>,
    pub is_group: bool,
    pub is_account: bool,
    pub is_profile: bool,
}

/// Validates a candidate post-state document against a resolved schema.
/// The real schema-validation library is an excluded external
/// collaborator (§1); this crate only defines the narrow entry point.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, document: &Value, schema: &Value) -> Result<(), String>;
}

pub struct SyncValidationHook {
    runtime: Arc<dyn CrdtRuntime>,
    resolver: SchemaResolver,
    validator: Arc<dyn SchemaValidator>,
    clock: Arc<dyn Clock>,
}

impl SyncValidationHook {
    pub fn new(runtime: Arc<dyn CrdtRuntime>, validator: Arc<dyn SchemaValidator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            resolver: SchemaResolver::new(Arc::clone(&runtime)),
            runtime,
            validator,
            clock,
        }
    }

    pub async fn check(&self, target_id: &CoId, header: &IncomingHeader) -> Decision {
        if header.is_group || header.is_account || header.is_profile {
            return Decision::Allow;
        }

        let Some(raw_schema) = header.schema.as_deref() else {
            return Decision::RejectWith(
                ErrorKind::SchemaMissing,
                format!("{target_id} carries no $schema"),
            );
        };

        if matches!(raw_schema, SCHEMA_ACCOUNT | SCHEMA_GROUP | SCHEMA_GENESIS) {
            return Decision::Allow;
        }

        let Ok(schema_id) = CoId::parse(raw_schema) else {
            return Decision::RejectWith(
                ErrorKind::SchemaMissing,
                format!("{raw_schema} is neither a reserved schema string nor a co-id"),
            );
        };

        let deadline = Deadline::after(DEFAULT_SCHEMA_WAIT, self.clock.as_ref());
        let ctx = CallContext::with_deadline(deadline);
        let schema_doc = match self
            .resolver
            .resolve(
                &crate::model::Identifier::CoId(schema_id.clone()),
                &ResolveOptions {
                    return_type: ReturnType::Schema,
                    spark: None,
                },
                &ctx,
            )
            .await
        {
            Ok(Resolved::Schema(doc)) => doc,
            Ok(Resolved::Missing) => {
                return Decision::RejectWith(ErrorKind::SchemaMissing, format!("schema {schema_id} not found"))
            }
            Ok(Resolved::CoId(_)) => unreachable!("ReturnType::Schema always yields Resolved::Schema"),
            Err(err) if err.kind() == ErrorKind::Timeout => {
                return Decision::RejectWith(ErrorKind::Timeout, format!("schema {schema_id} did not arrive in time"))
            }
            Err(err) => return Decision::RejectWith(err.kind(), err.message().to_string()),
        };

        let Some(target) = self.runtime.get_co_value(target_id) else {
            // Brand-new remote CoValue, nothing materialised yet: schema
            // availability alone has been established, let it through.
            return Decision::Allow;
        };
        if !target.is_available() {
            return Decision::Allow;
        }

        let post_state = target.content().to_json();
        match self.validator.validate(&post_state, &schema_doc) {
            Ok(()) => Decision::Allow,
            Err(reason) => Decision::RejectWith(ErrorKind::Validation, reason),
        }
    }
}

/// A permissive validator used where no real schema library is wired in
/// (tests, or a deployment that defers validation upstream).
pub struct AllowAllValidator;

impl SchemaValidator for AllowAllValidator {
    fn validate(&self, _document: &Value, _schema: &Value) -> Result<(), String> {
        Ok(())
    }
}
