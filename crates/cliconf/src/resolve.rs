//! Field resolution: flags, positional args, env and defaults into a struct.

use std::collections::{BTreeMap, HashSet};

use crate::binding::{Binding, Config, FieldSpec, bindings_of};
use crate::env::{EnvSource, Overlay, read_env_file};
use crate::error::{ConfigError, ParamCause, ParamDef, ParamError, ParamErrors, SchemaError};
use crate::flags::{FlagMap, parse_flags};

/// Flag that names a dotenv file to overlay on the environment, unless a
/// field claims the flag for itself.
pub const ENV_FILE_FLAG: &str = "envfile";

const BOOL_DEFAULT: &str = "false";

/// Structurally validated bindings, ready to be filled from one argv.
#[derive(Debug)]
pub struct Resolver<'a> {
    bindings: Vec<Binding<'a>>,
    args: BTreeMap<usize, usize>,
    remaining: Option<usize>,
    booleans: HashSet<String>,
    claims_env_file: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(bindings: Vec<Binding<'a>>) -> Result<Self, SchemaError> {
        let mut args = BTreeMap::new();
        let mut remaining: Option<usize> = None;
        let mut booleans = HashSet::new();
        let mut claims_env_file = false;

        for (idx, binding) in bindings.iter().enumerate() {
            let spec = binding.spec();
            spec.validate()?;

            if let Some(flag) = &spec.flag {
                if spec.is_bool {
                    booleans.insert(flag.clone());
                }
                if flag == ENV_FILE_FLAG {
                    claims_env_file = true;
                }
            }

            if let Some(n) = spec.arg {
                if let Some(prev) = args.insert(n, idx) {
                    return Err(SchemaError::DuplicateArg {
                        index: n,
                        first: bindings[prev].spec().field_name.clone(),
                        second: spec.field_name.clone(),
                    });
                }
            } else if spec.remaining {
                if let Some(prev) = remaining {
                    return Err(SchemaError::DuplicateRemaining {
                        first: bindings[prev].spec().field_name.clone(),
                        second: spec.field_name.clone(),
                    });
                }
                remaining = Some(idx);
            }
        }

        Ok(Self {
            bindings,
            args,
            remaining,
            booleans,
            claims_env_file,
        })
    }

    /// Fill every bound field from `args` and `env`.
    ///
    /// Tokenization and env file failures abort immediately. Everything else
    /// is collected, so one run reports every bad field at once.
    pub fn resolve<S: AsRef<str>>(
        mut self,
        args: &[S],
        env: &dyn EnvSource,
    ) -> Result<(), ConfigError> {
        let (mut flags, positionals) = parse_flags(args, &self.booleans)?;

        let env_file = if self.claims_env_file {
            None
        } else {
            flags.shift_remove(ENV_FILE_FLAG)
        };
        let overlay;
        let env: &dyn EnvSource = match env_file {
            Some(path) => {
                let top = read_env_file(&path)
                    .map_err(|source| ConfigError::EnvFile { path, source })?;
                overlay = Overlay::new(top, env);
                &overlay
            }
            None => env,
        };

        let mut errors = ParamErrors::new();
        self.assign_positionals(positionals, &mut errors);

        for binding in &mut self.bindings {
            if binding.spec().is_positional() {
                continue;
            }
            let Some(raw) = pop_value(binding.spec(), &mut flags, env) else {
                if !binding.spec().optional {
                    errors.push(ParamError::new(binding.spec().def(), ParamCause::Required));
                }
                continue;
            };
            if let Err(err) = binding.set(&raw) {
                errors.push(ParamError::new(binding.spec().def(), err));
            }
        }

        for name in flags.into_keys() {
            errors.push(ParamError::new(ParamDef::flag(name), ParamCause::UnknownFlag));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }

    fn assign_positionals(&mut self, positionals: Vec<String>, errors: &mut ParamErrors) {
        let count = positionals.len();
        let mut leftover = Vec::new();
        for (idx, arg) in positionals.into_iter().enumerate() {
            let Some(&b) = self.args.get(&idx) else {
                leftover.push(arg);
                continue;
            };
            let binding = &mut self.bindings[b];
            if let Err(err) = binding.set(&arg) {
                errors.push(ParamError::new(binding.spec().def(), err));
            }
        }

        for (_, &b) in self.args.range(count..) {
            let binding = &mut self.bindings[b];
            let spec = binding.spec();
            if let Some(default) = spec.default.clone() {
                if let Err(err) = binding.set(&default) {
                    errors.push(ParamError::new(binding.spec().def(), err));
                }
            } else if !spec.optional {
                errors.push(ParamError::new(spec.def(), ParamCause::Required));
            }
        }

        if leftover.is_empty() {
            return;
        }
        match self.remaining {
            Some(b) => self.bindings[b].set_remaining(leftover),
            None => errors.push(ParamError::new(
                ParamDef::remaining(),
                ParamCause::TooManyRemaining,
            )),
        }
    }
}

/// Flag, then non-empty env, then `false` for booleans, then the default.
fn pop_value(spec: &FieldSpec, flags: &mut FlagMap, env: &dyn EnvSource) -> Option<String> {
    if let Some(value) = spec.flag.as_ref().and_then(|f| flags.shift_remove(f)) {
        return Some(value);
    }
    if let Some(value) = spec
        .env
        .as_ref()
        .and_then(|name| env.get(name))
        .filter(|v| !v.is_empty())
    {
        return Some(value);
    }
    if spec.is_bool {
        return Some(BOOL_DEFAULT.to_string());
    }
    spec.default.clone()
}

/// Parse `args` and `env` into a fresh `C`.
pub fn parse<C, S>(args: &[S], env: &dyn EnvSource) -> Result<C, ConfigError>
where
    C: Config + Default,
    S: AsRef<str>,
{
    let mut config = C::default();
    parse_into(&mut config, args, env)?;
    Ok(config)
}

/// Parse into an existing value. Fields that resolve to nothing keep their
/// current value.
pub fn parse_into<C, S>(config: &mut C, args: &[S], env: &dyn EnvSource) -> Result<(), ConfigError>
where
    C: Config,
    S: AsRef<str>,
{
    Resolver::new(bindings_of(config))?.resolve(args, env)
}

/// Check the field declarations of `C` without parsing anything.
pub fn check_schema<C: Config + Default>() -> Result<(), SchemaError> {
    let mut config = C::default();
    Resolver::new(bindings_of(&mut config)).map(drop)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use serde::Deserialize;

    use super::*;
    use crate::coerce::Json;
    use crate::env::MapEnv;

    #[derive(Debug, Default, crate::Config)]
    struct TestConfig {
        #[config(flag = "foo", env = "FOO", description = "foo description")]
        foo: String,
        #[config(flag = "bar", env = "BAR", default = "bar", description = "bar description")]
        bar: String,
        #[config(flag = "baz", description = "baz description")]
        baz: bool,
        #[config(flag = ",arg0", optional, description = "arg description")]
        arg: String,
        #[config(flatten)]
        nested: NestedConfig,
    }

    #[derive(Debug, Default, crate::Config)]
    struct NestedConfig {
        #[config(flag = "n1", env = "N1", optional)]
        n1: String,
        #[config(flag = "n2")]
        n2: bool,
    }

    fn env(pairs: &[(&str, &str)]) -> MapEnv {
        pairs.iter().copied().collect()
    }

    fn parse_test(args: &[&str], pairs: &[(&str, &str)]) -> Result<TestConfig, ConfigError> {
        parse(args, &env(pairs))
    }

    fn param_errors(err: ConfigError) -> ParamErrors {
        match err {
            ConfigError::Params(errs) => errs,
            other => panic!("expected parameter errors, got {other:?}"),
        }
    }

    #[test]
    fn from_flags() {
        let got = parse_test(&["--foo=foo", "--bar=bar", "arg"], &[]).unwrap();
        assert_eq!(got.foo, "foo");
        assert_eq!(got.bar, "bar");
        assert_eq!(got.arg, "arg");
        assert!(!got.baz);
    }

    #[test]
    fn from_env() {
        let got = parse_test(&[], &[("FOO", "foo"), ("BAR", "bar")]).unwrap();
        assert_eq!(got.foo, "foo");
        assert_eq!(got.bar, "bar");
        assert_eq!(got.arg, "");
    }

    #[test]
    fn flag_overrides_env() {
        let got = parse_test(&["--foo=foo", "--bar=bar"], &[("FOO", "foo2"), ("BAR", "bar2")])
            .unwrap();
        assert_eq!(got.foo, "foo");
        assert_eq!(got.bar, "bar");
    }

    #[test]
    fn empty_env_is_unset() {
        let got = parse_test(&["--foo=foo"], &[("BAR", "")]).unwrap();
        assert_eq!(got.bar, "bar");
    }

    #[test]
    fn nested_fields() {
        let got = parse_test(&["--foo=foo", "--bar=bar", "--n1=n1", "--n2"], &[]).unwrap();
        assert_eq!(got.nested.n1, "n1");
        assert!(got.nested.n2);
    }

    #[test]
    fn boolean_before_positional_stays_false() {
        let got = parse_test(&["--foo=f", "--baz", "target"], &[]).unwrap();
        assert!(!got.baz);
        assert_eq!(got.arg, "target");

        let got = parse_test(&["--foo=f", "--baz", "TRUE", "target"], &[]).unwrap();
        assert!(got.baz);
        assert_eq!(got.arg, "target");
    }

    #[test]
    fn default_used_when_unset() {
        let got = parse_test(&["--foo=foo"], &[]).unwrap();
        assert_eq!(got.foo, "foo");
        assert_eq!(got.bar, "bar");
    }

    #[test]
    fn missing_required_field() {
        let errs = param_errors(parse_test(&[], &[]).unwrap_err());
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].def.name(), "--foo / $FOO");
        assert!(matches!(errs[0].cause, ParamCause::Required));
    }

    #[test]
    fn unknown_flags_reported_in_order() {
        let mut got = TestConfig::default();
        let err = parse_into(&mut got, &["--zz=1", "--foo=foo", "--aa=2"], &env(&[])).unwrap_err();
        let errs = param_errors(err);
        let names: Vec<_> = errs.iter().map(|e| e.def.name()).collect();
        assert_eq!(names, vec!["--zz", "--aa"]);
        assert!(errs.iter().all(|e| matches!(e.cause, ParamCause::UnknownFlag)));
        // valid fields are still filled in
        assert_eq!(got.foo, "foo");
    }

    #[test]
    fn nested_errors_use_qualified_field_name() {
        #[derive(Debug, Default, crate::Config)]
        struct Outer {
            #[config(flatten)]
            inner: Inner,
        }
        #[derive(Debug, Default, crate::Config)]
        struct Inner {
            #[config(flag = "port")]
            port: u16,
        }

        let errs = param_errors(parse::<Outer, _>(&["--port=x"], &env(&[])).unwrap_err());
        assert_eq!(errs[0].def.field_name, "inner.port");
        assert_eq!(errs[0].def.name(), "--port");
        assert!(matches!(errs[0].cause, ParamCause::Coerce(_)));
    }

    #[derive(Debug, Default, crate::Config)]
    struct Positional {
        #[config(arg = 0)]
        first: String,
        #[config(arg = 1, default = "two")]
        second: String,
        #[config(remaining)]
        rest: Vec<String>,
    }

    #[test]
    fn positionals_and_remaining() {
        let got: Positional = parse(&["a", "b", "c", "d"], &env(&[])).unwrap();
        assert_eq!(got.first, "a");
        assert_eq!(got.second, "b");
        assert_eq!(got.rest, vec!["c", "d"]);

        let got: Positional = parse(&["a"], &env(&[])).unwrap();
        assert_eq!(got.second, "two");
        assert!(got.rest.is_empty());
    }

    #[test]
    fn missing_positional_is_required() {
        let errs = param_errors(parse::<Positional, &str>(&[], &env(&[])).unwrap_err());
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].def.name(), "<arg0>");
    }

    #[test]
    fn too_many_args_without_remaining_field() {
        let errs = param_errors(parse_test(&["--foo=f", "one", "two", "three"], &[]).unwrap_err());
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].def.name(), "<remaining args>");
        assert!(matches!(errs[0].cause, ParamCause::TooManyRemaining));
    }

    #[test]
    fn tokenizer_error_aborts() {
        let errs = param_errors(parse_test(&["--foo"], &[]).unwrap_err());
        assert_eq!(errs.len(), 1);
        assert!(matches!(errs[0].cause, ParamCause::NoValue));
    }

    #[derive(Debug, Default, crate::Config)]
    struct TwoRemaining {
        #[config(remaining)]
        a: Vec<String>,
        #[config(flag = ",remaining")]
        b: Vec<String>,
    }

    #[derive(Debug, Default, crate::Config)]
    struct SameArg {
        #[config(arg = 0)]
        a: String,
        #[config(flag = ",arg0")]
        b: String,
    }

    #[test]
    fn schema_errors_are_eager() {
        assert_eq!(
            check_schema::<TwoRemaining>(),
            Err(SchemaError::DuplicateRemaining {
                first: "a".into(),
                second: "b".into()
            })
        );
        assert!(matches!(
            parse::<SameArg, &str>(&[], &env(&[])),
            Err(ConfigError::Schema(SchemaError::DuplicateArg { index: 0, .. }))
        ));
        assert!(check_schema::<TestConfig>().is_ok());
    }

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Endpoint {
        host: String,
        port: u16,
    }

    #[derive(Debug, Default, crate::Config)]
    struct Typed {
        #[config(flag = "count", default = "3")]
        count: i64,
        #[config(flag = "ratio", optional)]
        ratio: Option<f32>,
        #[config(flag = "timeout", default = "1m30s")]
        timeout: Duration,
        #[config(flag = "tags", env = "TAGS", default = "")]
        tags: Vec<String>,
        #[config(flag = "endpoint", json, optional)]
        endpoint: Endpoint,
        #[config(flag = "backup", optional)]
        backup: Option<Json<Endpoint>>,
        #[config(flag = "mode", from_str, default = "fast")]
        mode: Mode,
    }

    #[derive(Debug, Default, PartialEq)]
    enum Mode {
        #[default]
        Fast,
        Safe,
    }

    impl std::str::FromStr for Mode {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s {
                "fast" => Ok(Mode::Fast),
                "safe" => Ok(Mode::Safe),
                other => Err(format!("unknown mode {other:?}")),
            }
        }
    }

    #[test]
    fn coerces_field_types() {
        let got: Typed = parse(
            &[
                "--ratio",
                "0.5",
                "--endpoint",
                r#"{"host":"db","port":5432}"#,
                "--backup",
                r#"{"host":"db2","port":1}"#,
            ],
            &env(&[("TAGS", "a, b")]),
        )
        .unwrap();
        assert_eq!(got.count, 3);
        assert_eq!(got.ratio, Some(0.5));
        assert_eq!(got.timeout, Duration::from_secs(90));
        assert_eq!(got.tags, vec!["a", "b"]);
        assert_eq!(got.endpoint.host, "db");
        assert_eq!(got.backup.as_ref().map(|b| b.port), Some(1));
        assert_eq!(got.mode, Mode::Fast);
    }

    #[test]
    fn coercion_errors_are_collected() {
        let errs = param_errors(
            parse::<Typed, _>(&["--count=x", "--endpoint=db", "--mode=nope"], &env(&[]))
                .unwrap_err(),
        );
        let names: Vec<_> = errs.iter().map(|e| e.def.name()).collect();
        assert_eq!(names, vec!["--count", "--endpoint", "--mode"]);
    }

    #[test]
    fn env_file_overlays_environment() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "runkit-resolve-envfile-{}-{nanos}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test.env");
        std::fs::write(&path, "# comment\nFOO=from-file\nBAR=file-bar\n").unwrap();
        let path = path.to_string_lossy().into_owned();

        let got = parse_test(&["--envfile", path.as_str()], &[("BAR", "env-bar")]).unwrap();
        assert_eq!(got.foo, "from-file");
        assert_eq!(got.bar, "file-bar");

        let err = parse_test(&["--envfile=/no/such/file.env"], &[]).unwrap_err();
        assert!(matches!(err, ConfigError::EnvFile { .. }));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[derive(Debug, Default, crate::Config)]
    struct OwnsEnvFile {
        #[config(flag = "envfile")]
        envfile: String,
    }

    #[test]
    fn env_file_flag_can_be_claimed() {
        let got: OwnsEnvFile = parse(&["--envfile=/no/such/file.env"], &env(&[])).unwrap();
        assert_eq!(got.envfile, "/no/such/file.env");
    }
}
