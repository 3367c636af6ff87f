//! Execution context resolution.
//!
//! Every step gets a freshly layered context, lowest to highest precedence:
//!
//! 1. empty base
//! 2. every non-null command-line input
//! 3. global playbook keys (everything but `steps`)
//! 4. the step mapping itself
//! 5. command-line inputs that differ from their defaults
//!
//! Layer 5 re-asserts explicit flags so they win over step config. Inside a
//! container, `docker.docker_overrides` is merged on top and the `docker` carrier
//! is dropped before the action sees the context.

use serde::Serialize;
use serde_json::Value;

use crate::core::types::{Bag, Step};
use crate::error::PlaybookError;

/// Key of the container sub-mapping in step and global config.
pub const DOCKER_KEY: &str = "docker";
/// Key inside the container sub-mapping holding in-container overrides.
pub const OVERRIDES_KEY: &str = "docker_overrides";

/// A command-line input that participates in context layering.
#[derive(Debug, Clone, PartialEq)]
pub struct CliInput {
    pub key: &'static str,
    pub value: Option<Value>,
    pub default: Option<Value>,
}

/// Command-line inputs in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliInputs {
    inputs: Vec<CliInput>,
}

impl CliInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input with its declared default.
    pub fn with(mut self, key: &'static str, value: Option<Value>, default: Option<Value>) -> Self {
        self.inputs.push(CliInput {
            key,
            value,
            default,
        });
        self
    }

    fn present(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.inputs
            .iter()
            .filter_map(|input| input.value.as_ref().map(|v| (input.key, v)))
            .filter(|(_, v)| !v.is_null())
    }

    fn explicit(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.inputs
            .iter()
            .filter(|input| input.value.is_some() && input.value != input.default)
            .filter_map(|input| input.value.as_ref().map(|v| (input.key, v)))
            .filter(|(_, v)| !v.is_null())
    }
}

/// Resolved, immutable view of one step's configuration.
///
/// Keys the engine interprets are typed; everything else passes through in
/// `extra` untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionContext {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playbook: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relocate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker: Option<Bag>,
    #[serde(flatten)]
    pub extra: Bag,
}

impl ExecutionContext {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Flatten back into a single mapping (the shape actions and dumps see).
    pub fn to_bag(&self) -> Bag {
        let mut bag = self.extra.clone();
        bag.insert("action".to_string(), Value::String(self.action.clone()));
        let typed = [
            ("name", &self.name),
            ("playbook", &self.playbook),
            ("relocate", &self.relocate),
            ("container_name", &self.container_name),
        ];
        for (key, value) in typed {
            if let Some(v) = value {
                bag.insert(key.to_string(), Value::String(v.clone()));
            }
        }
        if let Some(docker) = &self.docker {
            bag.insert(DOCKER_KEY.to_string(), Value::Object(docker.clone()));
        }
        bag
    }

    fn from_bag(mut bag: Bag) -> Result<Self, PlaybookError> {
        let action = match bag.remove("action") {
            Some(Value::String(action)) => action,
            Some(other) => {
                return Err(PlaybookError::Syntax(format!(
                    "key `action` must be a string, got {other}"
                )));
            }
            None => return Err(PlaybookError::Syntax("missing key `action`".to_string())),
        };
        let name = take_string(&mut bag, "name")?;
        let playbook = take_string(&mut bag, "playbook")?;
        let relocate = take_string(&mut bag, "relocate")?;
        let container_name = take_string(&mut bag, "container_name")?;
        let docker = match bag.remove(DOCKER_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(other) => {
                return Err(PlaybookError::Syntax(format!(
                    "key `docker` must be a mapping, got {other}"
                )));
            }
        };
        Ok(Self {
            action,
            name,
            playbook,
            relocate,
            container_name,
            docker,
            extra: bag,
        })
    }
}

fn take_string(bag: &mut Bag, key: &str) -> Result<Option<String>, PlaybookError> {
    match bag.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(PlaybookError::Syntax(format!(
            "key `{key}` must be a string, got {other}"
        ))),
    }
}

/// Builds step contexts from fixed global config and command-line inputs.
#[derive(Debug, Clone, Copy)]
pub struct ContextResolver<'a> {
    global: &'a Bag,
    inputs: &'a CliInputs,
}

impl<'a> ContextResolver<'a> {
    pub fn new(global: &'a Bag, inputs: &'a CliInputs) -> Self {
        Self { global, inputs }
    }

    /// Resolve the context for `step`. Pure: same inputs, same context.
    pub fn resolve(
        &self,
        step: &Step,
        inside_container: bool,
    ) -> Result<ExecutionContext, PlaybookError> {
        let mut bag = Bag::new();
        for (key, value) in self.inputs.present() {
            bag.insert(key.to_string(), value.clone());
        }
        for (key, value) in self.global.iter().filter(|(key, _)| *key != "steps") {
            bag.insert(key.clone(), value.clone());
        }
        bag.extend(step.to_bag());
        for (key, value) in self.inputs.explicit() {
            bag.insert(key.to_string(), value.clone());
        }
        if inside_container {
            apply_container_overrides(&mut bag)?;
        }
        ExecutionContext::from_bag(bag)
    }
}

fn apply_container_overrides(bag: &mut Bag) -> Result<(), PlaybookError> {
    let overrides = match bag.get(DOCKER_KEY) {
        Some(Value::Object(docker)) => match docker.get(OVERRIDES_KEY) {
            Some(Value::Object(overrides)) => overrides.clone(),
            None | Some(Value::Null) => return Ok(()),
            Some(other) => {
                return Err(PlaybookError::Syntax(format!(
                    "key `docker.docker_overrides` must be a mapping, got {other}"
                )));
            }
        },
        _ => return Ok(()),
    };
    bag.extend(overrides);
    bag.remove(DOCKER_KEY);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(value: Value) -> Bag {
        match value {
            Value::Object(map) => map,
            other => panic!("expected mapping, got {other}"),
        }
    }

    fn step(value: Value) -> Step {
        serde_json::from_value(value).expect("step")
    }

    fn inputs(playbook: &str, container_name: Option<&str>) -> CliInputs {
        CliInputs::new()
            .with("playbook", Some(json!(playbook)), None)
            .with("relocate", None, None)
            .with("container_name", container_name.map(|n| json!(n)), None)
            .with("verbose", Some(json!(0)), Some(json!(0)))
    }

    #[test]
    fn step_config_beats_global_config() {
        let global = bag(json!({ "timeout": 10 }));
        let cli = inputs("site.yml", None);
        let resolver = ContextResolver::new(&global, &cli);

        let ctx = resolver
            .resolve(&step(json!({ "action": "train", "timeout": 5 })), false)
            .expect("resolve");

        assert_eq!(ctx.get("timeout"), Some(&json!(5)));
    }

    #[test]
    fn explicit_cli_input_beats_step_config() {
        let global = bag(json!({ "container_name": "from-global" }));
        let cli = inputs("site.yml", Some("from-cli"));
        let resolver = ContextResolver::new(&global, &cli);

        let ctx = resolver
            .resolve(
                &step(json!({ "action": "train", "container_name": "from-step" })),
                false,
            )
            .expect("resolve");

        assert_eq!(ctx.container_name.as_deref(), Some("from-cli"));
    }

    /// A CLI input left at its default is only a base layer: global and step
    /// config may both override it.
    #[test]
    fn defaulted_cli_input_is_only_a_base() {
        let global = bag(json!({ "verbose": 2 }));
        let cli = inputs("site.yml", None);
        let resolver = ContextResolver::new(&global, &cli);

        let ctx = resolver
            .resolve(&step(json!({ "action": "noop" })), false)
            .expect("resolve");
        assert_eq!(ctx.get("verbose"), Some(&json!(2)));

        let empty = Bag::new();
        let resolver = ContextResolver::new(&empty, &cli);
        let ctx = resolver
            .resolve(&step(json!({ "action": "noop" })), false)
            .expect("resolve");
        assert_eq!(ctx.get("verbose"), Some(&json!(0)));
        assert_eq!(ctx.playbook.as_deref(), Some("site.yml"));
    }

    #[test]
    fn resolving_does_not_touch_global_keys() {
        let global = bag(json!({ "dataset": "/data/a", "seed": 7 }));
        let before = global.clone();
        let cli = inputs("site.yml", None);
        let resolver = ContextResolver::new(&global, &cli);

        let first = resolver
            .resolve(&step(json!({ "action": "prep", "out": "x" })), false)
            .expect("resolve");
        let second = resolver
            .resolve(&step(json!({ "action": "train" })), false)
            .expect("resolve");

        assert_eq!(global, before);
        assert_eq!(first.get("dataset"), Some(&json!("/data/a")));
        assert_eq!(second.get("seed"), Some(&json!(7)));
        assert_eq!(second.get("out"), None);
    }

    #[test]
    fn resolution_is_idempotent() {
        let global = bag(json!({ "docker": { "image": "busybox" }, "lr": 0.1 }));
        let cli = inputs("site.yml", Some("box"));
        let resolver = ContextResolver::new(&global, &cli);
        let s = step(json!({ "action": "train", "name": "Train", "lr": 0.01 }));

        let a = resolver.resolve(&s, false).expect("resolve");
        let b = resolver.resolve(&s, false).expect("resolve");

        assert_eq!(a, b);
    }

    #[test]
    fn container_overrides_merge_last_and_drop_carrier() {
        let global = Bag::new();
        let cli = inputs("site.yml", None);
        let resolver = ContextResolver::new(&global, &cli);
        let s = step(json!({
            "action": "train",
            "data_dir": "/host/data",
            "docker": {
                "image": "trainer:1",
                "docker_overrides": { "data_dir": "/mnt/data" },
            },
        }));

        let host = resolver.resolve(&s, false).expect("host");
        let inside = resolver.resolve(&s, true).expect("inside");

        assert_eq!(host.get("data_dir"), Some(&json!("/host/data")));
        assert!(host.docker.is_some());
        assert_eq!(inside.get("data_dir"), Some(&json!("/mnt/data")));
        assert!(inside.docker.is_none());
    }

    #[test]
    fn docker_without_overrides_is_kept_inside_container() {
        let global = Bag::new();
        let cli = inputs("site.yml", None);
        let resolver = ContextResolver::new(&global, &cli);
        let s = step(json!({ "action": "train", "docker": { "image": "trainer:1" } }));

        let host = resolver.resolve(&s, false).expect("host");
        let inside = resolver.resolve(&s, true).expect("inside");

        assert_eq!(host, inside);
    }

    #[test]
    fn malformed_overrides_are_rejected() {
        let global = Bag::new();
        let cli = inputs("site.yml", None);
        let resolver = ContextResolver::new(&global, &cli);
        let s = step(json!({
            "action": "train",
            "docker": { "image": "trainer:1", "docker_overrides": ["nope"] },
        }));

        let err = resolver.resolve(&s, true).unwrap_err();
        assert!(err.to_string().contains("docker_overrides"));
    }

    #[test]
    fn to_bag_round_trips_typed_keys() {
        let global = bag(json!({ "docker": { "image": "busybox" } }));
        let cli = inputs("site.yml", Some("box"));
        let resolver = ContextResolver::new(&global, &cli);

        let ctx = resolver
            .resolve(&step(json!({ "action": "noop", "name": "n", "k": [1, 2] })), false)
            .expect("resolve");
        let flat = ctx.to_bag();

        assert_eq!(flat["action"], json!("noop"));
        assert_eq!(flat["container_name"], json!("box"));
        assert_eq!(flat["docker"], json!({ "image": "busybox" }));
        assert_eq!(ExecutionContext::from_bag(flat).expect("from_bag"), ctx);
    }
}
