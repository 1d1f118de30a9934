use clap::{Args, Parser, Subcommand};
use shadeconfig::VariableOverride;

#[derive(Parser, Debug)]
#[command(
    name = "shadeclock",
    author,
    version,
    about = "Set Hyprland screen shaders on a daily schedule"
)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Set the screen shader based on the schedule.
    Auto,
    /// Turn on a screen shader.
    On(OnArgs),
    /// Turn off the screen shader.
    Off,
    /// Toggle between a shader and off, or a fallback shader.
    ///
    /// Without SHADER the scheduled shader is used. `--fallback-auto` falls
    /// back to the scheduled shader, or to the default one when SHADER is the
    /// scheduled shader.
    Toggle(ToggleArgs),
    /// Print the current screen shader; prints nothing when none is active.
    Current(ListArgs),
    /// List available screen shaders; the active one is marked with `*`.
    Ls(ListArgs),
    /// Install systemd user units that re-apply the schedule.
    Install,
}

#[derive(Args, Debug)]
pub struct OnArgs {
    /// Shader name or path.
    #[arg(value_name = "SHADER")]
    pub shader: String,

    #[command(flatten)]
    pub vars: VarArgs,
}

#[derive(Args, Debug)]
pub struct ToggleArgs {
    /// Shader name or path.
    #[arg(value_name = "SHADER")]
    pub shader: Option<String>,

    /// Select fallback shader.
    #[arg(
        long,
        value_name = "SHADER",
        conflicts_with_all = ["fallback_default", "fallback_auto"]
    )]
    pub fallback: Option<String>,

    /// Use the default shader as fallback.
    #[arg(long, conflicts_with = "fallback_auto")]
    pub fallback_default: bool,

    /// Infer the fallback from the schedule.
    #[arg(long)]
    pub fallback_auto: bool,

    #[command(flatten)]
    pub vars: VarArgs,
}

#[derive(Args, Debug, Default)]
pub struct VarArgs {
    /// Variables passed to templated shaders; dotted keys nest. May be repeated.
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub overrides: Vec<VariableOverride>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Long listing format.
    #[arg(short, long)]
    pub long: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use shadeconfig::Variable;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_variable_overrides() {
        let cli = Cli::try_parse_from([
            "shadeclock",
            "on",
            "warm",
            "--var",
            "balance.red=1.5",
            "--var",
            "mode=night",
        ])
        .unwrap();
        let Command::On(args) = cli.command else {
            panic!("expected `on`");
        };
        assert_eq!(args.shader, "warm");
        assert_eq!(args.vars.overrides[0].key, "balance.red");
        assert_eq!(args.vars.overrides[0].value, Variable::Float(1.5));
        assert_eq!(args.vars.overrides[1].value, Variable::String("night".into()));
    }

    #[test]
    fn rejects_override_without_separator() {
        assert!(Cli::try_parse_from(["shadeclock", "on", "warm", "--var", "oops"]).is_err());
    }

    #[test]
    fn fallback_options_are_exclusive() {
        for extra in [
            ["--fallback", "cool", "--fallback-auto"],
            ["--fallback-default", "--fallback-auto", "-v"],
        ] {
            let mut args = vec!["shadeclock", "toggle", "warm"];
            args.extend(extra);
            assert!(Cli::try_parse_from(args).is_err());
        }

        let cli = Cli::try_parse_from(["shadeclock", "-v", "toggle", "--fallback-auto"]).unwrap();
        assert!(cli.verbose);
        let Command::Toggle(args) = cli.command else {
            panic!("expected `toggle`");
        };
        assert!(args.shader.is_none());
        assert!(args.fallback_auto);
    }
}
