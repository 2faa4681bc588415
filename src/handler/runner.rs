// src/handler/runner.rs

//! Scoped execution of one handler method for one task.
//!
//! `run` constructs the handler with the task's context, invokes the
//! requested method, and tears the handler down on every exit path: normal
//! return, returned error, or a panic inside the method. Failures come back
//! as `TaskExecution` errors carrying the step and task index; they never
//! affect sibling tasks.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::{EvalflowError, Result};
use crate::handler::{HandlerFactory, HandlerMethod, PipelineHandler, TaskInput};

/// Owns a constructed handler and guarantees `teardown` runs exactly once.
struct HandlerScope {
    handler: Option<Box<dyn PipelineHandler>>,
    label: String,
}

impl HandlerScope {
    fn new(handler: Box<dyn PipelineHandler>, label: String) -> Self {
        Self {
            handler: Some(handler),
            label,
        }
    }

    fn invoke(&mut self, method: HandlerMethod, input: &TaskInput) -> anyhow::Result<Value> {
        let handler = self
            .handler
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("handler already released"))?;
        match method {
            HandlerMethod::Ppl => handler.ppl(input),
            HandlerMethod::Cmp => handler.cmp(input),
        }
    }

    /// Tear the handler down now and report the outcome.
    fn release(mut self) -> anyhow::Result<()> {
        match self.handler.take() {
            Some(mut handler) => {
                debug!(task = %self.label, "tearing down handler");
                handler.teardown()
            }
            None => Ok(()),
        }
    }
}

impl Drop for HandlerScope {
    fn drop(&mut self) {
        if let Some(mut handler) = self.handler.take() {
            debug!(task = %self.label, "tearing down handler on early exit");
            if let Err(e) = handler.teardown() {
                warn!(task = %self.label, error = %e, "handler teardown failed");
            }
        }
    }
}

/// Run `method` of the handler produced by `factory` for the task described
/// by `input`.
pub fn run(factory: &HandlerFactory, method: HandlerMethod, input: &TaskInput) -> Result<Value> {
    let ctx = input.context();
    let label = format!("{}-{}", ctx.step(), ctx.task_index());
    let task_error = |cause: String| EvalflowError::TaskExecution {
        step: ctx.step().to_string(),
        task_index: ctx.task_index(),
        cause,
    };

    info!(
        job = %ctx.job_id(),
        task = %label,
        handler = %factory.entry_name(),
        %method,
        "start running task"
    );

    let handler = panic::catch_unwind(AssertUnwindSafe(|| factory.construct(ctx)))
        .map_err(|payload| task_error(format!("handler construction panicked: {}", panic_message(&payload))))?
        .map_err(|e| task_error(format!("constructing handler '{}': {e:#}", factory.entry_name())))?;

    let mut scope = HandlerScope::new(handler, label.clone());
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| scope.invoke(method, input)));

    let result = match outcome {
        Ok(Ok(value)) => {
            let released = panic::catch_unwind(AssertUnwindSafe(|| scope.release()));
            match released {
                Ok(Ok(())) => Ok(value),
                Ok(Err(e)) => Err(task_error(format!("handler teardown failed: {e:#}"))),
                Err(payload) => Err(task_error(format!(
                    "handler teardown panicked: {}",
                    panic_message(&payload)
                ))),
            }
        }
        Ok(Err(e)) => {
            drop(scope);
            Err(task_error(format!("{e:#}")))
        }
        Err(payload) => {
            drop(scope);
            Err(task_error(format!("handler panicked: {}", panic_message(&payload))))
        }
    };

    match &result {
        Ok(_) => info!(job = %ctx.job_id(), task = %label, "finished running task"),
        Err(e) => warn!(job = %ctx.job_id(), task = %label, error = %e, "task failed"),
    }

    result
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
