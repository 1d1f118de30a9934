use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveTime};
use scheduler::{Schedule, ShaderSelection};
use shadeconfig::{
    expand_overrides, merge_sources, ConfigError, ConfigTree, VariableOverride, VariableSet,
};
use shaders::{materialize, source_of, InstanceStore, ResolvedShader, ShaderDirs, ShaderIdentity};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, ListArgs, ToggleArgs};
use crate::display::{DisplayControl, Hyprctl};
use crate::install::write_units;
use crate::paths::systemd_user_dir;

pub fn run(cli: Cli) -> Result<()> {
    let app = App::discover(Hyprctl::from_env())?;
    let now = Local::now().time();
    debug!(%now, "evaluating command");

    match cli.command {
        Command::Auto => app.auto(now),
        Command::On(args) => app.on(&args.shader, &args.vars.overrides, now),
        Command::Off => app.off(),
        Command::Toggle(args) => app.toggle(&args, now),
        Command::Current(args) => {
            if let Some(line) = app.current(&args)? {
                println!("{line}");
            }
            Ok(())
        }
        Command::Ls(args) => {
            for line in app.ls(&args)? {
                println!("{line}");
            }
            Ok(())
        }
        Command::Install => {
            let executable =
                std::env::current_exe().context("failed to locate the shadeclock executable")?;
            app.install(&systemd_user_dir()?, &executable)
        }
    }
}

pub fn initialise_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// A missing config is tolerated until a command needs the schedule.
enum LoadedConfig {
    Found(ConfigTree),
    Missing(Vec<PathBuf>),
}

struct App<D> {
    display: D,
    config: LoadedConfig,
    dirs: ShaderDirs,
    store: InstanceStore,
}

impl<D: DisplayControl> App<D> {
    fn discover(display: D) -> Result<Self> {
        let config = match ConfigTree::discover() {
            Ok(config) => {
                info!(document = config.document(), "loaded config");
                LoadedConfig::Found(config)
            }
            Err(ConfigError::NotFound { searched }) => {
                debug!(?searched, "no config file found");
                LoadedConfig::Missing(searched)
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            display,
            config,
            dirs: ShaderDirs::discover(),
            store: InstanceStore::discover()?,
        })
    }

    fn config(&self) -> Option<&ConfigTree> {
        match &self.config {
            LoadedConfig::Found(config) => Some(config),
            LoadedConfig::Missing(_) => None,
        }
    }

    fn require_config(&self) -> Result<&ConfigTree> {
        match &self.config {
            LoadedConfig::Found(config) => Ok(config),
            LoadedConfig::Missing(searched) => Err(ConfigError::NotFound {
                searched: searched.clone(),
            }
            .into()),
        }
    }

    fn auto(&self, now: NaiveTime) -> Result<()> {
        let schedule = Schedule::new(self.require_config()?);
        match schedule.scheduled_shader(now)? {
            Some(shader) => self.activate(shader, &[]),
            None => self.off(),
        }
    }

    fn on(&self, shader: &str, overrides: &[VariableOverride], now: NaiveTime) -> Result<()> {
        let shader = self.named(shader, now)?;
        self.activate(shader, overrides)
    }

    fn off(&self) -> Result<()> {
        info!("turning screen shader off");
        self.display.clear()
    }

    fn toggle(&self, args: &ToggleArgs, now: NaiveTime) -> Result<()> {
        let config = if args.fallback_default || args.fallback_auto {
            Some(self.require_config()?)
        } else {
            self.config()
        };
        let (scheduled, default) = match config {
            Some(config) => {
                let schedule = Schedule::new(config);
                (schedule.scheduled_shader(now)?, schedule.default_shader()?)
            }
            None => (None, None),
        };

        let shader = match &args.shader {
            Some(name) => Some(self.named(name, now)?),
            None => scheduled.clone(),
        };
        let fallback = match &args.fallback {
            Some(name) => Some(self.named(name, now)?),
            None if args.fallback_default => default,
            None if args.fallback_auto
                && self.same(identity_of(&shader), identity_of(&scheduled)) =>
            {
                default
            }
            None if args.fallback_auto => scheduled,
            None => None,
        };

        let current = self.current_shader()?.map(|current| current.identity);
        let target = if self.same(identity_of(&shader), current.as_ref()) {
            fallback
        } else {
            shader
        };
        match target {
            Some(target) => self.activate(target, &args.vars.overrides),
            None => self.off(),
        }
    }

    fn current(&self, args: &ListArgs) -> Result<Option<String>> {
        Ok(self.current_shader()?.map(|current| {
            if args.long {
                format!("{}  {}", current.name(), current.dirname().display())
            } else {
                current.name().to_string()
            }
        }))
    }

    fn ls(&self, args: &ListArgs) -> Result<Vec<String>> {
        let mut shaders: Vec<ResolvedShader> = self
            .dirs
            .listing()
            .into_iter()
            .map(|path| ResolvedShader {
                identity: ShaderIdentity::from_path(&path),
                path,
            })
            .collect();

        let current = self.current_shader()?;
        let mut current_listed = true;
        if let Some(current) = &current {
            if !shaders.contains(current) {
                current_listed = false;
                let at = shaders.partition_point(|shader| shader.name() <= current.name());
                shaders.insert(at, current.clone());
            }
        }

        let width = shaders.iter().map(|shader| shader.name().len()).max().unwrap_or(0) + 1;
        let lines = shaders
            .iter()
            .map(|shader| {
                let is_current = current.as_ref() == Some(shader);
                let mark = if is_current { '*' } else { ' ' };
                let name = shader.name();
                if args.long {
                    format!("{mark} {name:width$} {}", shader.dirname().display())
                } else if is_current && !current_listed {
                    format!("{mark} {name}  ({})", shader.dirname().display())
                } else {
                    format!("{mark} {name}")
                }
            })
            .collect();
        Ok(lines)
    }

    fn install(&self, unit_dir: &Path, executable: &Path) -> Result<()> {
        let schedule = Schedule::new(self.require_config()?);
        let event_times = schedule.event_times()?;
        write_units(unit_dir, executable, &event_times)?;
        Ok(())
    }

    /// A shader given by name, with the config variables for that name.
    fn named(&self, name: &str, now: NaiveTime) -> Result<ShaderSelection> {
        let identity = ShaderIdentity::parse(name)?;
        let variables = match self.config() {
            Some(config) => Schedule::new(config).variables_at(identity.name(), now)?,
            None => VariableSet::new(),
        };
        Ok(ShaderSelection {
            identity,
            variables,
        })
    }

    fn activate(&self, selection: ShaderSelection, overrides: &[VariableOverride]) -> Result<()> {
        let ShaderSelection {
            identity: shader,
            variables: configured,
        } = selection;
        let resolved = shader.resolve(&self.dirs)?;
        let variables = merge_sources([configured, expand_overrides(overrides)]);
        if let Ok(json) = serde_json::to_string(&variables) {
            debug!(shader = %shader, variables = %json, "merged template variables");
        }
        let path = materialize(&resolved, &variables, &self.store)?;
        info!(shader = %shader, path = %path.display(), "turning screen shader on");
        self.display.set(&path)
    }

    /// The active shader, traced back to its template when it is a rendered
    /// instance.
    fn current_shader(&self) -> Result<Option<ResolvedShader>> {
        let Some(active) = self.display.current()? else {
            return Ok(None);
        };
        let source = if active.is_file() {
            source_of(&active)?.unwrap_or(active)
        } else {
            active
        };
        Ok(Some(ResolvedShader {
            identity: ShaderIdentity::from_path(&source),
            path: source,
        }))
    }

    fn same(&self, lhs: Option<&ShaderIdentity>, rhs: Option<&ShaderIdentity>) -> bool {
        match (lhs, rhs) {
            (None, None) => true,
            (Some(lhs), Some(rhs)) => lhs.same_shader(rhs, &self.dirs),
            _ => false,
        }
    }
}

fn identity_of(selection: &Option<ShaderSelection>) -> Option<&ShaderIdentity> {
    selection.as_ref().map(|selection| &selection.identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;

    use crate::cli::VarArgs;

    #[derive(Default)]
    struct FakeDisplay {
        active: RefCell<Option<PathBuf>>,
    }

    impl DisplayControl for FakeDisplay {
        fn set(&self, path: &Path) -> Result<()> {
            *self.active.borrow_mut() = Some(path.to_path_buf());
            Ok(())
        }

        fn clear(&self) -> Result<()> {
            *self.active.borrow_mut() = None;
            Ok(())
        }

        fn current(&self) -> Result<Option<PathBuf>> {
            Ok(self.active.borrow().clone())
        }
    }

    const CONFIG: &str = r#"
[[shaders]]
name = "warm"
start_time = 20:00:00
end_time = 23:00:00

[shaders.variables]
strength = 0.8
label = "evening"

[[shaders]]
name = "cool"
default = true
"#;

    struct Fixture {
        _temp: tempfile::TempDir,
        shader_dir: PathBuf,
        state_dir: PathBuf,
        app: App<FakeDisplay>,
    }

    fn fixture(config: Option<&str>) -> Fixture {
        let temp = tempfile::tempdir().unwrap();
        let shader_dir = temp.path().join("shaders");
        let state_dir = temp.path().join("state");
        fs::create_dir_all(&shader_dir).unwrap();
        fs::write(shader_dir.join("cool.glsl"), "// cool").unwrap();
        fs::write(
            shader_dir.join("warm.glsl.mustache"),
            "// {{label}} {{#nc}}{{strength}} ? 0.5{{/nc}}",
        )
        .unwrap();

        let config = match config {
            Some(input) => {
                LoadedConfig::Found(ConfigTree::from_toml_str(input, "test.toml").unwrap())
            }
            None => LoadedConfig::Missing(vec![temp.path().join("config.toml")]),
        };
        let app = App {
            display: FakeDisplay::default(),
            config,
            dirs: ShaderDirs::new(vec![shader_dir.clone()]),
            store: InstanceStore::new(&state_dir),
        };
        Fixture {
            _temp: temp,
            shader_dir,
            state_dir,
            app,
        }
    }

    fn time(raw: &str) -> NaiveTime {
        NaiveTime::parse_from_str(raw, "%H:%M:%S").unwrap()
    }

    fn active(fixture: &Fixture) -> Option<PathBuf> {
        fixture.app.display.active.borrow().clone()
    }

    fn toggle_args(shader: Option<&str>) -> ToggleArgs {
        ToggleArgs {
            shader: shader.map(str::to_string),
            fallback: None,
            fallback_default: false,
            fallback_auto: false,
            vars: VarArgs::default(),
        }
    }

    #[test]
    fn auto_renders_the_scheduled_template() {
        let fixture = fixture(Some(CONFIG));
        fixture.app.auto(time("21:00:00")).unwrap();

        let path = active(&fixture).unwrap();
        assert_eq!(path, fixture.state_dir.join("warm.glsl"));
        let rendered = fs::read_to_string(&path).unwrap();
        assert!(rendered.ends_with("// EVENING 0.8"), "{rendered}");
    }

    const REPEATED: &str = r#"
[[shaders]]
name = "warm"
start_time = 08:00:00
end_time = 09:00:00

[shaders.variables]
strength = 0.2
label = "morning"

[[shaders]]
name = "warm"
start_time = 20:00:00
end_time = 21:00:00

[shaders.variables]
strength = 0.8
label = "evening"
"#;

    #[test]
    fn repeated_shader_renders_with_its_own_entry() {
        let fixture = fixture(Some(REPEATED));
        fixture.app.auto(time("20:30:00")).unwrap();
        let rendered = fs::read_to_string(active(&fixture).unwrap()).unwrap();
        assert!(rendered.ends_with("// EVENING 0.8"), "{rendered}");

        fixture.app.auto(time("08:30:00")).unwrap();
        let rendered = fs::read_to_string(active(&fixture).unwrap()).unwrap();
        assert!(rendered.ends_with("// MORNING 0.2"), "{rendered}");

        fixture.app.off().unwrap();
        let mut args = toggle_args(None);
        args.fallback_auto = true;
        fixture.app.toggle(&args, time("20:30:00")).unwrap();
        let rendered = fs::read_to_string(active(&fixture).unwrap()).unwrap();
        assert!(rendered.ends_with("// EVENING 0.8"), "{rendered}");
    }

    #[test]
    fn auto_falls_back_to_default() {
        let fixture = fixture(Some(CONFIG));
        fixture.app.auto(time("09:00:00")).unwrap();
        assert_eq!(active(&fixture), Some(fixture.shader_dir.join("cool.glsl")));
    }

    #[test]
    fn auto_requires_a_config() {
        let fixture = fixture(None);
        let err = fixture.app.auto(time("09:00:00")).unwrap_err();
        assert!(err.to_string().contains("could not find a config file"));
    }

    #[test]
    fn on_applies_overrides_without_uppercasing() {
        let fixture = fixture(None);
        let overrides = ["label=night".parse().unwrap(), "strength=1".parse().unwrap()];
        fixture.app.on("warm", &overrides, time("09:00:00")).unwrap();

        let rendered = fs::read_to_string(active(&fixture).unwrap()).unwrap();
        assert!(rendered.ends_with("// night 1"), "{rendered}");
    }

    #[test]
    fn overrides_win_over_config_variables() {
        let fixture = fixture(Some(CONFIG));
        let overrides = ["strength=0.3".parse().unwrap()];
        fixture.app.on("warm", &overrides, time("09:00:00")).unwrap();

        let rendered = fs::read_to_string(active(&fixture).unwrap()).unwrap();
        assert!(rendered.ends_with("// EVENING 0.3"), "{rendered}");
    }

    #[test]
    fn toggle_switches_between_shader_and_off() {
        let fixture = fixture(None);
        let args = toggle_args(Some("cool"));
        fixture.app.toggle(&args, time("12:00:00")).unwrap();
        assert_eq!(active(&fixture), Some(fixture.shader_dir.join("cool.glsl")));
        fixture.app.toggle(&args, time("12:00:00")).unwrap();
        assert_eq!(active(&fixture), None);
    }

    #[test]
    fn toggle_recognises_rendered_instances() {
        let fixture = fixture(Some(CONFIG));
        let mut args = toggle_args(None);
        args.fallback_auto = true;

        fixture.app.toggle(&args, time("21:00:00")).unwrap();
        assert_eq!(active(&fixture), Some(fixture.state_dir.join("warm.glsl")));

        fixture.app.toggle(&args, time("21:00:00")).unwrap();
        assert_eq!(active(&fixture), Some(fixture.shader_dir.join("cool.glsl")));
    }

    #[test]
    fn current_maps_instances_back_to_their_source() {
        let fixture = fixture(Some(CONFIG));
        let short = ListArgs { long: false };
        assert_eq!(fixture.app.current(&short).unwrap(), None);

        fixture.app.on("warm", &[], time("21:00:00")).unwrap();
        assert_eq!(fixture.app.current(&short).unwrap().as_deref(), Some("warm"));
        let long = fixture.app.current(&ListArgs { long: true }).unwrap().unwrap();
        assert_eq!(long, format!("warm  {}", fixture.shader_dir.display()));
    }

    #[test]
    fn ls_marks_the_active_shader() {
        let fixture = fixture(None);
        fixture.app.on("cool", &[], time("12:00:00")).unwrap();
        let lines = fixture.app.ls(&ListArgs { long: false }).unwrap();
        assert_eq!(lines, ["* cool", "  warm"]);
    }

    #[test]
    fn ls_shows_where_an_unlisted_shader_lives() {
        let fixture = fixture(None);
        let elsewhere = fixture._temp.path().join("extra");
        fs::create_dir_all(&elsewhere).unwrap();
        let path = elsewhere.join("dim.glsl");
        fs::write(&path, "").unwrap();
        fixture.app.on(path.to_str().unwrap(), &[], time("12:00:00")).unwrap();

        let lines = fixture.app.ls(&ListArgs { long: false }).unwrap();
        assert_eq!(
            lines,
            [
                "  cool".to_string(),
                format!("* dim  ({})", elsewhere.display()),
                "  warm".to_string(),
            ]
        );
    }

    #[test]
    fn install_writes_units_for_the_schedule() {
        let fixture = fixture(Some(CONFIG));
        let unit_dir = fixture.state_dir.join("units");
        fixture
            .app
            .install(&unit_dir, Path::new("/usr/bin/shadeclock"))
            .unwrap();
        let timer = fs::read_to_string(unit_dir.join("shadeclock.timer")).unwrap();
        assert!(timer.contains("OnCalendar=*-*-* 20:00:00\nOnCalendar=*-*-* 23:00:00\n"));
    }
}
