//! Closure disclosure and delegate revelation.
//!
//! A closure defers name resolution to the moment it is consumed: the
//! same spelling resolves against whichever scope chain is active then,
//! which is what makes inherited rules evaluate correctly in derived
//! projects. Disclosure binds the name to a [`Binding`], producing a
//! delegate; revelation invokes the delegate's target.

use crate::error::ValueError;
use crate::expand::{Expand, expand_values};
use crate::scope::{Binding, BindingTarget, ScopeStack};
use crate::value::{Kind, Value};

/// Early-exit signal surfaced by an executable target.
#[derive(Debug, Clone)]
pub struct BreakSignal {
    pub message: String,
    pub pos: Option<String>,
}

/// A callable binding target: invoked with expanded arguments, the return
/// value is the revelation result.
pub trait Callable: Send + Sync {
    fn name(&self) -> &str;
    fn call(&self, args: &[Value], scope: &ScopeStack) -> Result<Value, ValueError>;
}

/// A side-effecting command form. Execution yields a value list plus zero
/// or more breakers.
pub trait Invocable: Send + Sync {
    fn name(&self) -> &str;
    fn invoke(&self, args: &[Value], scope: &ScopeStack) -> (Vec<Value>, Vec<BreakSignal>);
}

/// Resolve a field against a value that carries a scope (an opaque
/// payload exposing one). Used for dotted selections.
pub(crate) fn resolve_in_base(base: &Value, field: &str) -> Option<(Binding, String)> {
    if let Kind::Any(payload) = base.kind()
        && let Some(scope) = payload.as_scope()
    {
        return scope
            .lookup(field)
            .map(|binding| (binding, format!("{}.{field}", payload.type_name())));
    }
    None
}

fn resolve_name(
    name: &Value,
    mask: Expand,
    scope: &ScopeStack,
) -> Result<Option<(Binding, String)>, ValueError> {
    match name.kind() {
        Kind::Bareword(s) | Kind::Str(s) | Kind::Qualiword(s) => {
            Ok(scope.lookup(s).map(|binding| (binding, s.clone())))
        }
        // Dotted access: resolve the selected object first, then look the
        // field up in its scope.
        Kind::Selection { base, field } => {
            let resolved = base.expand(mask | Expand::DISCLOSE | Expand::REVEAL, scope)?;
            Ok(resolve_in_base(&resolved, field))
        }
        _ => Ok(None),
    }
}

impl Value {
    /// Disclose a closure: resolve its name against the active scope
    /// chain, yielding a delegate. An unresolvable name leaves the
    /// closure unchanged — later consumers may hold richer scopes.
    ///
    /// With `REVEAL` also set, disclosure chains straight into
    /// revelation, so one call fully normalizes.
    pub fn disclose(&self, mask: Expand, scope: &ScopeStack) -> Result<Value, ValueError> {
        let Kind::Closure { name, args } = self.kind() else {
            return Ok(self.clone());
        };
        let Some((binding, label)) = resolve_name(name, mask, scope)? else {
            let (out, changed) = expand_values(args, mask, scope)?;
            return Ok(if changed {
                Value::closure(name.clone(), out)
            } else {
                self.clone()
            });
        };
        let delegate = Value::delegate(binding, args.clone(), label);
        if mask.has(Expand::REVEAL) {
            delegate.reveal(mask, scope)
        } else {
            Ok(delegate)
        }
    }

    /// Reveal a delegate: invoke its resolved target with expanded
    /// arguments.
    ///
    /// A revelation that yields the delegate itself (directly or inside
    /// its result) is a detected cycle, not an infinite loop. With
    /// `DISCLOSE` also set, a result that still contains closures is
    /// expanded again.
    pub fn reveal(&self, mask: Expand, scope: &ScopeStack) -> Result<Value, ValueError> {
        let Kind::Delegate {
            binding,
            args,
            name,
        } = self.kind()
        else {
            return Ok(self.clone());
        };
        let (expanded_args, _) = expand_values(args, mask, scope)?;
        let result = match &binding.target {
            BindingTarget::Plain(value) => value.clone(),
            BindingTarget::Callable(callable) => callable.call(&expanded_args, scope)?,
            BindingTarget::Invocable(invocable) => {
                // Side-effecting forms run only under explicit INVOKE.
                if !mask.has(Expand::INVOKE) {
                    return Ok(self.clone());
                }
                let (values, breaks) = invocable.invoke(&expanded_args, scope);
                if !breaks.is_empty() {
                    let message = breaks
                        .iter()
                        .map(|b| b.message.as_str())
                        .collect::<Vec<_>>()
                        .join("; ");
                    return Err(ValueError::Break {
                        message,
                        pos: breaks.into_iter().next().and_then(|b| b.pos),
                    });
                }
                Value::list(values)
            }
        };
        if result.refs(self) {
            return Err(ValueError::SelfDelegation { name: name.clone() });
        }
        if mask.has(Expand::DISCLOSE) && result.closured() {
            return result.expand(mask, scope);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{MapScope, Origin, Scope};
    use std::sync::{Arc, Mutex};

    struct Upper;

    impl Callable for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn call(&self, args: &[Value], _scope: &ScopeStack) -> Result<Value, ValueError> {
            let text = args
                .first()
                .map(|v| v.strval())
                .transpose()?
                .unwrap_or_default();
            Ok(Value::str(text.to_uppercase()))
        }
    }

    fn scope_with(name: &str, binding: Binding) -> ScopeStack {
        ScopeStack::of(Arc::new(MapScope::new().bind(name, binding)))
    }

    #[test]
    fn disclose_then_reveal_in_two_steps() {
        let scope = scope_with("cc", Binding::plain(Value::str("clang"), Origin::Variable));
        let closure = Value::closure(Value::bareword("cc"), Vec::new());

        let delegate = closure
            .disclose(Expand::DISCLOSE, &scope)
            .expect("disclosure");
        assert!(matches!(delegate.kind(), Kind::Delegate { .. }));
        assert!(!delegate.closured());

        let value = delegate.reveal(Expand::REVEAL, &scope).expect("revelation");
        assert_eq!(value.to_string(), "clang");
    }

    #[test]
    fn disclose_chains_into_reveal_when_both_bits_set() {
        let scope = scope_with("upper", Binding::callable(Arc::new(Upper), Origin::Builtin));
        let closure = Value::closure(Value::bareword("upper"), vec![Value::str("abc")]);

        let value = closure
            .expand(Expand::DISCLOSE | Expand::REVEAL, &scope)
            .expect("full normalization in one call");
        assert_eq!(value.to_string(), "ABC");
    }

    #[test]
    fn unresolved_names_stay_closured_without_error() {
        let closure = Value::closure(Value::bareword("missing"), Vec::new());
        let same = closure
            .expand(Expand::DISCLOSE | Expand::REVEAL, &ScopeStack::new())
            .expect("unresolved is not an error");
        assert!(same.ptr_eq(&closure));
        assert!(same.closured());
    }

    #[test]
    fn scope_decides_what_a_name_means_at_consumption_time() {
        let closure = Value::closure(Value::bareword("cc"), Vec::new());

        let base = scope_with("cc", Binding::plain(Value::str("gcc"), Origin::Variable));
        let derived = base.pushed(Arc::new(
            MapScope::new().bind("cc", Binding::plain(Value::str("clang"), Origin::Variable)),
        ));

        let in_base = closure
            .expand(Expand::DISCLOSE | Expand::REVEAL, &base)
            .expect("base resolution");
        let in_derived = closure
            .expand(Expand::DISCLOSE | Expand::REVEAL, &derived)
            .expect("derived resolution");
        assert_eq!(in_base.to_string(), "gcc");
        assert_eq!(in_derived.to_string(), "clang");
    }

    // Returns whatever value was planted, letting a test plant the
    // delegate itself.
    struct EchoCell {
        cell: Mutex<Option<Value>>,
    }

    impl Callable for EchoCell {
        fn name(&self) -> &str {
            "echo-cell"
        }

        fn call(&self, _args: &[Value], _scope: &ScopeStack) -> Result<Value, ValueError> {
            Ok(self
                .cell
                .lock()
                .expect("cell lock")
                .clone()
                .unwrap_or_else(Value::none))
        }
    }

    #[test]
    fn self_delegation_is_detected_not_recursed() {
        let echo = Arc::new(EchoCell {
            cell: Mutex::new(None),
        });
        let delegate = Value::delegate(
            Binding::callable(echo.clone(), Origin::Rule),
            Vec::new(),
            "loop",
        );
        *echo.cell.lock().expect("cell lock") = Some(delegate.clone());

        let err = delegate
            .reveal(Expand::REVEAL, &ScopeStack::new())
            .expect_err("must detect the cycle");
        assert!(matches!(err, ValueError::SelfDelegation { ref name } if name == "loop"));
    }

    #[test]
    fn self_delegation_inside_a_composite_is_also_detected() {
        let echo = Arc::new(EchoCell {
            cell: Mutex::new(None),
        });
        let delegate = Value::delegate(
            Binding::callable(echo.clone(), Origin::Rule),
            Vec::new(),
            "wrapped-loop",
        );
        *echo.cell.lock().expect("cell lock") =
            Some(Value::list(vec![Value::int(1), delegate.clone()]));

        let err = delegate
            .reveal(Expand::REVEAL, &ScopeStack::new())
            .expect_err("cycle hidden in a list");
        assert!(matches!(err, ValueError::SelfDelegation { .. }));
    }

    struct FailingRun;

    impl Invocable for FailingRun {
        fn name(&self) -> &str {
            "failing-run"
        }

        fn invoke(&self, _args: &[Value], _scope: &ScopeStack) -> (Vec<Value>, Vec<BreakSignal>) {
            (
                Vec::new(),
                vec![BreakSignal {
                    message: "exit status 2".to_string(),
                    pos: Some("rules:14".to_string()),
                }],
            )
        }
    }

    struct ListingRun;

    impl Invocable for ListingRun {
        fn name(&self) -> &str {
            "listing-run"
        }

        fn invoke(&self, _args: &[Value], _scope: &ScopeStack) -> (Vec<Value>, Vec<BreakSignal>) {
            (vec![Value::str("a.o"), Value::str("b.o")], Vec::new())
        }
    }

    #[test]
    fn executables_run_only_under_invoke() {
        let delegate = Value::delegate(
            Binding::invocable(Arc::new(ListingRun), Origin::Rule),
            Vec::new(),
            "objs",
        );

        let held = delegate
            .reveal(Expand::REVEAL, &ScopeStack::new())
            .expect("no invoke bit, no execution");
        assert!(held.ptr_eq(&delegate));

        let ran = delegate
            .reveal(Expand::REVEAL | Expand::INVOKE, &ScopeStack::new())
            .expect("executed");
        assert!(matches!(ran.kind(), Kind::List(items) if items.len() == 2));
    }

    #[test]
    fn breakers_surface_as_errors() {
        let delegate = Value::delegate(
            Binding::invocable(Arc::new(FailingRun), Origin::Rule),
            Vec::new(),
            "build-step",
        );
        let err = delegate
            .reveal(Expand::REVEAL | Expand::INVOKE, &ScopeStack::new())
            .expect_err("breaker becomes an error");
        assert!(matches!(err, ValueError::Break { ref message, .. } if message.contains("exit status 2")));
    }

    struct ObjectScope {
        bindings: MapScope,
    }

    impl std::fmt::Debug for ObjectScope {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "ObjectScope")
        }
    }

    impl crate::value::Opaque for ObjectScope {
        fn type_name(&self) -> &str {
            "subproject"
        }

        fn render(&self) -> String {
            "<subproject>".to_string()
        }

        fn as_scope(&self) -> Option<&dyn Scope> {
            Some(&self.bindings)
        }
    }

    #[test]
    fn selection_resolves_into_the_selected_objects_scope() {
        let object = Value::any(Arc::new(ObjectScope {
            bindings: MapScope::new()
                .bind("cc", Binding::plain(Value::str("tcc"), Origin::Variable)),
        }));
        let scope = scope_with("sub", Binding::plain(object, Origin::Variable));

        let closure = Value::closure(
            Value::selection(
                Value::closure(Value::bareword("sub"), Vec::new()),
                "cc",
            ),
            Vec::new(),
        );
        let value = closure
            .expand(Expand::DISCLOSE | Expand::REVEAL, &scope)
            .expect("dotted resolution");
        assert_eq!(value.to_string(), "tcc");
    }
}
