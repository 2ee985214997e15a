//! Introspection Cache
//!
//! Operation signatures are only known at runtime. [`introspect`] asks the
//! native registry for an operation's arguments once, classifies them into
//! a [`Manifest`], and memoizes the result for the life of the process.
//!
//! ## Classification
//!
//! Arguments are walked in declaration order:
//!
//! - the first required, non-deprecated image input is the implicit
//!   receiver (`member_x`)
//! - other required, non-deprecated inputs are `required_input`
//! - inputs that are not required are `optional_input`
//! - required, non-deprecated outputs and required modify inputs are
//!   `required_output`
//! - outputs that are not required are `optional_output`
//!
//! ## Names
//!
//! Native names use `-` as separator, host names use `_`. Manifests are
//! keyed by host name; [`ArgumentDescriptor::native_name`] is what goes
//! back to the native library.

use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use indexmap::IndexMap;
use opbridge_native::{
    object_get_args, object_get_description, operation_classes, operation_get_flags,
    operation_new, types, type_is_a, ArgSpec, ArgumentFlags, NativeType, OperationFlags,
};
use smol_str::SmolStr;
use tracing::debug;

use crate::error::{take_native_error, BridgeError, BridgeResult};
use crate::image::native;
use crate::object::ObjectRef;

// ============================================================================
// Argument Descriptor
// ============================================================================

/// One construction argument of an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentDescriptor {
    /// Host spelling (`_` separated)
    pub name: SmolStr,
    /// Native spelling (`-` separated)
    pub native_name: &'static str,
    /// Native argument flags
    pub flags: ArgumentFlags,
    /// Native type id
    pub type_id: NativeType,
    /// One-line description
    pub blurb: &'static str,
}

impl ArgumentDescriptor {
    fn from_spec(spec: &ArgSpec) -> Self {
        Self {
            name: host_name(spec.name),
            native_name: spec.name,
            flags: spec.flags,
            type_id: spec.type_id,
            blurb: spec.blurb,
        }
    }

    pub fn is_required(&self) -> bool {
        self.flags.contains(ArgumentFlags::REQUIRED)
    }

    pub fn is_input(&self) -> bool {
        self.flags.contains(ArgumentFlags::INPUT)
    }

    pub fn is_output(&self) -> bool {
        self.flags.contains(ArgumentFlags::OUTPUT)
    }

    pub fn is_deprecated(&self) -> bool {
        self.flags.contains(ArgumentFlags::DEPRECATED)
    }

    pub fn is_modify(&self) -> bool {
        self.flags.contains(ArgumentFlags::MODIFY)
    }

    /// Check if the argument takes or returns an image
    pub fn is_image(&self) -> bool {
        type_is_a(self.type_id, types::IMAGE)
    }

    /// Check if the argument takes an array of images
    pub fn is_image_array(&self) -> bool {
        self.type_id == types::ARRAY_IMAGE
    }
}

/// Translate a native argument name to its host spelling.
pub fn host_name(native: &str) -> SmolStr {
    if native.contains('-') {
        SmolStr::new(native.replace('-', "_"))
    } else {
        SmolStr::new(native)
    }
}

// ============================================================================
// Manifest
// ============================================================================

/// Classified argument table of one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    operation: SmolStr,
    description: &'static str,
    deprecated: bool,
    nocache: bool,
    arguments: IndexMap<SmolStr, ArgumentDescriptor>,
    member_x: Option<SmolStr>,
    positional: Vec<SmolStr>,
    required_input: Vec<SmolStr>,
    optional_input: Vec<SmolStr>,
    required_output: Vec<SmolStr>,
    optional_output: Vec<SmolStr>,
    modify_input: Vec<SmolStr>,
    mutable: bool,
}

impl Manifest {
    /// Classify an argument list given in declaration order.
    pub fn from_arguments(
        operation: &str,
        description: &'static str,
        flags: OperationFlags,
        args: &[ArgSpec],
    ) -> Self {
        let mut manifest = Manifest {
            operation: SmolStr::new(operation),
            description,
            deprecated: flags.contains(OperationFlags::DEPRECATED),
            nocache: flags.contains(OperationFlags::NOCACHE),
            arguments: IndexMap::with_capacity(args.len()),
            member_x: None,
            positional: Vec::new(),
            required_input: Vec::new(),
            optional_input: Vec::new(),
            required_output: Vec::new(),
            optional_output: Vec::new(),
            modify_input: Vec::new(),
            mutable: false,
        };

        for spec in args {
            let arg = ArgumentDescriptor::from_spec(spec);
            let name = arg.name.clone();

            if arg.is_input() {
                if arg.is_required() && !arg.is_deprecated() {
                    manifest.positional.push(name.clone());
                    if manifest.member_x.is_none() && arg.is_image() {
                        manifest.member_x = Some(name.clone());
                    } else {
                        manifest.required_input.push(name.clone());
                    }
                    if arg.is_modify() {
                        manifest.required_output.push(name.clone());
                        manifest.mutable = true;
                    }
                } else if !arg.is_required() {
                    manifest.optional_input.push(name.clone());
                }
                if arg.is_modify() {
                    manifest.modify_input.push(name.clone());
                }
            }

            if arg.is_output() {
                if arg.is_required() && !arg.is_deprecated() {
                    manifest.required_output.push(name.clone());
                } else if !arg.is_required() {
                    manifest.optional_output.push(name.clone());
                }
            }

            manifest.arguments.insert(name, arg);
        }

        manifest
    }

    /// Ask the native registry for an operation's arguments.
    fn load(operation: &str) -> BridgeResult<Self> {
        let op = operation_new(operation).map_err(|_| BridgeError::UnknownOperation {
            operation: SmolStr::new(operation),
            native: take_native_error(),
        })?;
        let op = ObjectRef::steal(op);

        let description = native(object_get_description(op.as_ptr()))?;
        let flags = native(operation_get_flags(op.as_ptr()))?;
        let args = native(object_get_args(op.as_ptr()))?;
        Ok(Self::from_arguments(operation, description, flags, &args))
    }

    /// Operation name
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// One-line description of the operation
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Whether the whole operation is deprecated
    pub fn is_deprecated(&self) -> bool {
        self.deprecated
    }

    /// Whether the native cache never reuses this operation
    pub fn is_nocache(&self) -> bool {
        self.nocache
    }

    /// Look up an argument by host name
    pub fn argument(&self, name: &str) -> Option<&ArgumentDescriptor> {
        self.arguments.get(name)
    }

    /// All arguments in declaration order
    pub fn arguments(&self) -> impl Iterator<Item = &ArgumentDescriptor> {
        self.arguments.values()
    }

    /// The implicit receiver, if the operation has one
    pub fn member_x(&self) -> Option<&ArgumentDescriptor> {
        self.member_x.as_deref().and_then(|name| self.argument(name))
    }

    /// Every required input, receiver included, in declaration order
    pub fn positional(&self) -> impl Iterator<Item = &ArgumentDescriptor> {
        self.lookup(&self.positional)
    }

    /// Number of positional arguments a plain call takes
    pub fn positional_count(&self) -> usize {
        self.positional.len()
    }

    /// Required inputs excluding the receiver
    pub fn required_input(&self) -> impl Iterator<Item = &ArgumentDescriptor> {
        self.lookup(&self.required_input)
    }

    /// Number of positional arguments a method call takes
    pub fn required_input_count(&self) -> usize {
        self.required_input.len()
    }

    pub fn optional_input(&self) -> impl Iterator<Item = &ArgumentDescriptor> {
        self.lookup(&self.optional_input)
    }

    pub fn required_output(&self) -> impl Iterator<Item = &ArgumentDescriptor> {
        self.lookup(&self.required_output)
    }

    pub fn optional_output(&self) -> impl Iterator<Item = &ArgumentDescriptor> {
        self.lookup(&self.optional_output)
    }

    pub fn modify_input(&self) -> impl Iterator<Item = &ArgumentDescriptor> {
        self.lookup(&self.modify_input)
    }

    /// Look up an optional input by host name
    pub fn find_optional_input(&self, name: &str) -> Option<&ArgumentDescriptor> {
        self.optional_input
            .iter()
            .any(|n| n == name)
            .then(|| self.argument(name))
            .flatten()
    }

    /// Look up an optional output by host name
    pub fn find_optional_output(&self, name: &str) -> Option<&ArgumentDescriptor> {
        self.optional_output
            .iter()
            .any(|n| n == name)
            .then(|| self.argument(name))
            .flatten()
    }

    /// Whether the operation modifies one of its inputs in place
    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    fn lookup<'a>(&'a self, names: &'a [SmolStr]) -> impl Iterator<Item = &'a ArgumentDescriptor> {
        names.iter().filter_map(move |name| self.arguments.get(name))
    }

    /// Human-readable summary of the signature.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "{} - {}", self.operation, self.description);
        if self.deprecated {
            out.push_str(" (deprecated)");
        }
        out.push('\n');

        let mut section = |title: &str, args: Vec<&ArgumentDescriptor>| {
            if args.is_empty() {
                return;
            }
            let _ = writeln!(out, "{}:", title);
            for arg in args {
                let _ = writeln!(
                    out,
                    "   {:<16} {:<14} {:<24} {}",
                    arg.name,
                    arg.type_id.name(),
                    arg.flags.to_string(),
                    arg.blurb
                );
            }
        };
        section("self", self.member_x().into_iter().collect());
        section("required input", self.required_input().collect());
        section("optional input", self.optional_input().collect());
        section("output", self.required_output().collect());
        section("optional output", self.optional_output().collect());
        out
    }
}

// ============================================================================
// Process-wide Cache
// ============================================================================

static MANIFESTS: OnceLock<DashMap<SmolStr, Arc<Manifest>>> = OnceLock::new();

fn manifests() -> &'static DashMap<SmolStr, Arc<Manifest>> {
    MANIFESTS.get_or_init(DashMap::new)
}

/// Get the manifest of an operation, building it on first use.
///
/// The manifest is built outside the map and published insert-once, so
/// concurrent first callers all receive the same `Arc`.
pub fn introspect(operation: &str) -> BridgeResult<Arc<Manifest>> {
    if let Some(manifest) = manifests().get(operation) {
        return Ok(Arc::clone(manifest.value()));
    }

    debug!(operation, "introspecting operation");
    let built = Arc::new(Manifest::load(operation)?);
    let published = manifests()
        .entry(SmolStr::new(operation))
        .or_insert(built)
        .value()
        .clone();
    Ok(published)
}

/// Drop every cached manifest.
pub fn flush() {
    manifests().clear();
}

/// Name and description of every registered operation.
pub fn operations() -> Vec<(&'static str, &'static str)> {
    operation_classes()
        .map(|class| (class.nickname, class.description))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names<'a>(args: impl Iterator<Item = &'a ArgumentDescriptor>) -> Vec<&'a str> {
        args.map(|arg| arg.name.as_str()).collect()
    }

    #[test]
    fn test_add_has_receiver() {
        let manifest = introspect("add").unwrap();
        assert_eq!(manifest.member_x().map(|a| a.name.as_str()), Some("left"));
        assert_eq!(names(manifest.required_input()), vec!["right"]);
        assert_eq!(names(manifest.positional()), vec!["left", "right"]);
        assert_eq!(names(manifest.required_output()), vec!["out"]);
        assert!(!manifest.is_mutable());
    }

    #[test]
    fn test_black_has_no_receiver() {
        let manifest = introspect("black").unwrap();
        assert!(manifest.member_x().is_none());
        assert_eq!(names(manifest.required_input()), vec!["width", "height"]);
        assert_eq!(names(manifest.optional_input()), vec!["bands"]);
        assert_eq!(manifest.positional_count(), 2);
    }

    #[test]
    fn test_native_names_are_translated() {
        let manifest = introspect("getpoint").unwrap();
        let out = manifest.argument("out_array").unwrap();
        assert_eq!(out.native_name, "out-array");
        assert!(manifest.argument("out-array").is_none());
        assert_eq!(names(manifest.required_output()), vec!["out_array"]);
    }

    #[test]
    fn test_optional_outputs_and_deprecated_inputs() {
        let max = introspect("max").unwrap();
        assert_eq!(names(max.optional_output()), vec!["x", "y"]);
        assert!(max.find_optional_output("x").is_some());
        assert!(max.find_optional_input("x").is_none());

        let copy = introspect("copy").unwrap();
        let swap = copy.find_optional_input("swap").unwrap();
        assert!(swap.is_deprecated());
    }

    #[test]
    fn test_modify_argument() {
        let manifest = introspect("draw_rect").unwrap();
        assert!(manifest.is_mutable());
        assert!(manifest.is_nocache());
        assert_eq!(manifest.member_x().map(|a| a.name.as_str()), Some("image"));
        assert_eq!(names(manifest.modify_input()), vec!["image"]);
        assert_eq!(names(manifest.required_output()), vec!["image"]);
        assert_eq!(manifest.required_input_count(), 5);
    }

    #[test]
    fn test_unknown_operation() {
        let err = introspect("frobnicate").unwrap_err();
        assert!(matches!(err, BridgeError::UnknownOperation { .. }));
        assert!(err.to_string().contains("frobnicate"));
        assert_eq!(opbridge_native::error_buffer(), "");
    }

    #[test]
    fn test_manifest_is_shared() {
        let first = introspect("invert").unwrap();
        let second = introspect("invert").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_from_arguments_skips_deprecated_required() {
        let args = [
            ArgSpec {
                name: "in",
                blurb: "",
                type_id: types::IMAGE,
                flags: ArgumentFlags::REQUIRED | ArgumentFlags::INPUT,
            },
            ArgSpec {
                name: "old-style",
                blurb: "",
                type_id: types::INT,
                flags: ArgumentFlags::REQUIRED | ArgumentFlags::INPUT | ArgumentFlags::DEPRECATED,
            },
        ];
        let manifest = Manifest::from_arguments("test", "", OperationFlags::NONE, &args);
        assert_eq!(manifest.positional_count(), 1);
        assert_eq!(manifest.required_input_count(), 0);
        assert!(manifest.argument("old_style").is_some());
    }

    #[test]
    fn test_describe() {
        let text = introspect("linear").unwrap().describe();
        assert!(text.starts_with("linear - calculate (a * in + b)\n"));
        assert!(text.contains("self:\n   in"));
        assert!(text.contains("optional input:\n   uchar"));
    }
}
