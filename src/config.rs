use crate::task::Task;

/// Configuration entry-point for instantiating the executor.
///
/// A concrete `Config` binds a specific `Task` implementation to the executor,
/// which in turn fixes the key, output and error types via the associated
/// types on `Task`. Task kinds that differ in behavior are variants of that one
/// type (usually an enum), so every dependency edge stays statically typed.
pub trait Config: Sized + 'static {
    /// The user-defined task type that the executor will explore and run.
    type Task: Task<Self>;
}
