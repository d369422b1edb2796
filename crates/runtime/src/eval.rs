//! Remote expression evaluation.
//!
//! Expressions are attribute paths with optional zero-argument calls:
//!
//! ```text
//! dex.getClasses()
//! com.pnfsoftware.jeb.core.units.code.android.IDexUnit
//! ctx.getMainProject().getName()
//! ```
//!
//! The leading name is taken from the caller's bindings first and otherwise
//! resolved against the namespace, longest dotted prefix first.

use std::collections::HashMap;

use crate::host::{HostError, HostResult, HostValue};
use crate::namespace::Namespace;

/// One `.`-separated step of an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment<'a> {
	name: &'a str,
	call: bool,
}

/// Evaluates `expression` against `namespace` with `bindings` in scope.
pub fn evaluate<N: Namespace + ?Sized>(
	namespace: &N,
	expression: &str,
	bindings: &HashMap<String, HostValue>,
) -> HostResult<HostValue> {
	let segments = parse(expression)?;

	let (mut value, consumed) = match bindings.get(segments[0].name) {
		Some(bound) => (bound.clone(), 1),
		None => resolve_root(namespace, &segments)?,
	};

	for segment in &segments[consumed..] {
		let object = match &value {
			HostValue::Object(object) => object.clone(),
			_ => {
				return Err(HostError::type_error(format!(
					"cannot access '{}' on a non-object value",
					segment.name
				)));
			}
		};
		value = if segment.call {
			object.call(segment.name, Vec::new())?
		} else {
			object.get_attr(segment.name)?
		};
	}

	Ok(value)
}

/// Longest run of leading plain names that the namespace resolves.
fn resolve_root<N: Namespace + ?Sized>(
	namespace: &N,
	segments: &[Segment<'_>],
) -> HostResult<(HostValue, usize)> {
	let plain = segments.iter().take_while(|s| !s.call).count();

	for len in (1..=plain).rev() {
		let name = segments[..len]
			.iter()
			.map(|s| s.name)
			.collect::<Vec<_>>()
			.join(".");
		if let Some(object) = namespace.lookup(&name) {
			return Ok((HostValue::Object(object), len));
		}
	}

	Err(HostError::new(
		"NameError",
		format!("name '{}' is not defined", segments[0].name),
	))
}

fn parse(expression: &str) -> HostResult<Vec<Segment<'_>>> {
	let expression = expression.trim();
	if expression.is_empty() {
		return Err(syntax_error(expression, "empty expression"));
	}

	expression
		.split('.')
		.map(|raw| {
			let raw = raw.trim();
			let (name, call) = match raw.strip_suffix("()") {
				Some(name) => (name.trim_end(), true),
				None => (raw, false),
			};
			if is_identifier(name) {
				Ok(Segment { name, call })
			} else {
				Err(syntax_error(expression, &format!("invalid name '{raw}'")))
			}
		})
		.collect()
}

fn is_identifier(name: &str) -> bool {
	let mut chars = name.chars();
	match chars.next() {
		Some(first) if first.is_alphabetic() || first == '_' || first == '$' => {}
		_ => return false,
	}
	chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn syntax_error(expression: &str, reason: &str) -> HostError {
	HostError::new("SyntaxError", format!("{reason} in '{expression}'"))
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use serde_json::json;

	use super::*;
	use crate::host::HostObject;
	use crate::namespace::ModuleRegistry;

	struct Dex;

	impl HostObject for Dex {
		fn type_name(&self) -> &str {
			"IDexUnit"
		}

		fn get_attr(&self, name: &str) -> HostResult<HostValue> {
			match name {
				"name" => Ok("classes.dex".into()),
				_ => Err(HostError::attribute(self.type_name(), name)),
			}
		}

		fn call(&self, method: &str, _args: Vec<HostValue>) -> HostResult<HostValue> {
			match method {
				"getClassCount" => Ok(HostValue::from(3i64)),
				"self" => Ok(HostValue::object(Dex)),
				_ => Err(HostError::method(self.type_name(), method)),
			}
		}
	}

	fn registry() -> ModuleRegistry {
		let registry = ModuleRegistry::new();
		registry.register_package("com.host.units", || {
			Ok(vec![(
				"IDexUnit".to_string(),
				Arc::new(Dex) as Arc<dyn HostObject>,
			)])
		});
		registry.load("com.host.units").unwrap();
		registry
	}

	fn no_bindings() -> HashMap<String, HostValue> {
		HashMap::new()
	}

	#[test]
	fn bound_names_take_precedence() {
		let bindings = HashMap::from([("dex".to_string(), HostValue::object(Dex))]);

		let count = evaluate(&registry(), "dex.getClassCount()", &bindings).unwrap();
		assert_eq!(count.as_data(), Some(&json!(3)));

		let name = evaluate(&registry(), " dex.self().name ", &bindings).unwrap();
		assert_eq!(name.as_data(), Some(&json!("classes.dex")));
	}

	#[test]
	fn dotted_names_resolve_through_the_namespace() {
		let value = evaluate(&registry(), "com.host.units.IDexUnit.name", &no_bindings()).unwrap();
		assert_eq!(value.as_data(), Some(&json!("classes.dex")));

		let package = evaluate(&registry(), "com.host", &no_bindings()).unwrap();
		assert_eq!(package.as_object().unwrap().type_name(), "package");
	}

	#[test]
	fn unknown_names_and_bad_syntax_are_reported() {
		let err = evaluate(&registry(), "missing.thing", &no_bindings()).unwrap_err();
		assert_eq!(err.name, "NameError");

		let err = evaluate(&registry(), "dex..name", &no_bindings()).unwrap_err();
		assert_eq!(err.name, "SyntaxError");

		let err = evaluate(&registry(), "", &no_bindings()).unwrap_err();
		assert_eq!(err.name, "SyntaxError");
	}

	#[test]
	fn data_values_have_no_attributes() {
		let bindings = HashMap::from([("n".to_string(), HostValue::from(1i64))]);
		let err = evaluate(&registry(), "n.value", &bindings).unwrap_err();
		assert_eq!(err.name, "TypeError");
	}
}
