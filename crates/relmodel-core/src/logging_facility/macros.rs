//! Boundary logging macros
//!
//! Only the public model boundaries use these: `resolve`, `create`,
//! `delete`, `undelete`, `clone` and `update_with`. Each start is followed by
//! exactly one end or error event. Dispatcher and closure internals log with
//! plain `trace!`/`debug!`.

/// Log entry into a model boundary
///
/// Extra fields follow `tracing` syntax; instance and entity ids are the
/// usual ones.
///
/// # Example
///
/// ```
/// # use relmodel_core::log_op_start;
/// log_op_start!("resolve", entity_id = "Folder");
/// log_op_start!("undelete", instance_id = "0192", restore_properties = true);
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_START,
        );
    };
    ($op:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_START,
            $($field)*
        );
    };
}

/// Log the successful end of a model boundary
///
/// `duration_ms` is required. `create` also reports the new instance id and
/// `clone` the number of clones.
///
/// # Example
///
/// ```
/// # use relmodel_core::log_op_end;
/// log_op_end!("delete", duration_ms = 3);
/// log_op_end!("create", duration_ms = 0, instance_id = "0193");
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END,
            duration_ms = $duration,
        );
    };
    ($op:expr, duration_ms = $duration:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END,
            duration_ms = $duration,
            $($field)*
        );
    };
}

/// Log a model boundary that failed
///
/// The [`ModelError`](crate::errors::ModelError) is converted into
/// [`ExError`](crate::errors::ExError); the event carries `err.kind` and the
/// stable `err.code`.
///
/// # Example
///
/// ```
/// # use relmodel_core::{log_op_error, errors::ModelError, EntityId};
/// let err = ModelError::EntityMismatch {
///     left: EntityId::new("Folder"),
///     right: EntityId::new("Item"),
/// };
/// log_op_error!("update_with", err, duration_ms = 1);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr) => {{
        use $crate::errors::ExError;
        let ex_err: ExError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err.kind = ?ex_err.kind(),
            err.code = ex_err.code(),
        );
    }};
    ($op:expr, $err:expr, duration_ms = $duration:expr, $($field:tt)*) => {{
        use $crate::errors::ExError;
        let ex_err: ExError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err.kind = ?ex_err.kind(),
            err.code = ex_err.code(),
            $($field)*
        );
    }};
}
