//! Type-safe tool argument contracts.
//!
//! Every external program the pipeline invokes is described by a struct
//! implementing [`ToolArgs`]. The struct definition is the contract: a flag
//! typo is a compile error, not a runtime failure halfway through a host
//! configuration.

/// Trait for typed tool arguments.
///
/// # Contract
///
/// - `program()`: name (resolved through `PATH`) or absolute path of the binary.
/// - `to_cli_args()`: arguments exactly as the program expects them.
/// - `get_env_vars()`: extra environment the program needs.
///
/// # Example
///
/// ```ignore
/// use rootless_setup::tools::account::UsermodArgs;
///
/// let args = UsermodArgs::append_group("svc", "systemd-journal");
/// assert_eq!(args.to_cli_args(), ["-aG", "systemd-journal", "svc"]);
/// ```
pub trait ToolArgs {
    /// Binary to execute.
    fn program(&self) -> String;

    /// Convert struct fields to CLI arguments.
    fn to_cli_args(&self) -> Vec<String>;

    /// Get required environment variables.
    fn get_env_vars(&self) -> Vec<(String, String)> {
        vec![]
    }
}
