//! Fallback discovery of UI text setters.
//!
//! When the string table cannot be found (or is found but bypassed by the
//! UI), text can still be caught on its way into widgets. Setters found
//! here are bound as pre-execution wrappers on their first argument.

use tracing::debug;

use super::{CallSiteSink, DiscoveryPolicy, lookup_type};
use crate::host::{CallShape, CandidateCallSite, MemberInfo, TypeInfo, TypeRegistry};

/// Member names that set widget text.
pub const SETTER_NAMES: [&str; 2] = ["SetText", "set_text"];

/// Result of one fallback round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FallbackOutcome {
    /// Widget types resolved in the registry.
    pub types_found: usize,
    /// Sites accepted by the sink, including ones already bound.
    pub bound: usize,
}

impl FallbackOutcome {
    pub fn found(&self) -> bool {
        self.bound > 0
    }
}

fn is_setter_name(member: &MemberInfo) -> bool {
    SETTER_NAMES.iter().any(|name| member.is_named(name))
}

fn exact_setter(member: &MemberInfo) -> bool {
    is_setter_name(member) && member.params.len() == 1 && member.params[0].is_string()
}

fn named_setter(member: &MemberInfo) -> bool {
    is_setter_name(member) && member.first_param().is_some_and(|p| p.is_string_like())
}

fn takes_text(member: &MemberInfo) -> bool {
    member.first_param().is_some_and(|p| p.is_string_like())
}

/// Setter members of a widget type, from the best non-empty tier:
/// exact `(string)` signatures, then same-named members taking a string-like
/// first parameter, then the first member of any name taking one.
pub fn setter_candidates(ty: &TypeInfo) -> Vec<&MemberInfo> {
    let exact: Vec<&MemberInfo> = ty.members.iter().filter(|m| exact_setter(m)).collect();
    if !exact.is_empty() {
        return exact;
    }
    let named: Vec<&MemberInfo> = ty.members.iter().filter(|m| named_setter(m)).collect();
    if !named.is_empty() {
        return named;
    }
    ty.members.iter().find(|m| takes_text(m)).into_iter().collect()
}

/// Every setter overload with a string-like first parameter.
pub fn overload_candidates(ty: &TypeInfo) -> Vec<&MemberInfo> {
    ty.members.iter().filter(|m| named_setter(m)).collect()
}

/// Runs one fallback round over the configured widget types, then sweeps
/// setter overloads of the configured overload types.
pub fn run_fallback<R, S>(registry: &R, sink: &S, policy: &DiscoveryPolicy) -> FallbackOutcome
where
    R: TypeRegistry + ?Sized,
    S: CallSiteSink + ?Sized,
{
    let mut outcome = FallbackOutcome::default();

    for name in &policy.widget_types {
        let Some(ty) = lookup_type(registry, name, None) else {
            debug!("Widget type {} not loaded", name);
            continue;
        };
        outcome.types_found += 1;
        for member in setter_candidates(&ty) {
            if offer(sink, &ty, member) {
                outcome.bound += 1;
            }
        }
    }

    for name in &policy.overload_types {
        let Some(ty) = lookup_type(registry, name, None) else {
            continue;
        };
        for member in overload_candidates(&ty) {
            if offer(sink, &ty, member) {
                outcome.bound += 1;
            }
        }
    }

    outcome
}

fn offer<S: CallSiteSink + ?Sized>(sink: &S, ty: &TypeInfo, member: &MemberInfo) -> bool {
    sink.offer(CandidateCallSite::new(
        ty.full_name.clone(),
        member.clone(),
        CallShape::RawCallback,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::TypeRef;

    fn widget(members: Vec<MemberInfo>) -> TypeInfo {
        TypeInfo {
            full_name: "TMPro.TMP_Text".to_string(),
            members,
        }
    }

    fn tokens(members: Vec<&MemberInfo>) -> Vec<u64> {
        members.into_iter().map(|m| m.token).collect()
    }

    #[test]
    fn test_exact_signatures_win() {
        let ty = widget(vec![
            MemberInfo::method(1, "SetText", &[TypeRef::named("Il2CppSystem.String"), TypeRef::Int], TypeRef::Void),
            MemberInfo::method(2, "SetText", &[TypeRef::String], TypeRef::Void),
            MemberInfo::setter(3, "text", TypeRef::String),
        ]);
        assert_eq!(tokens(setter_candidates(&ty)), vec![2, 3]);
    }

    #[test]
    fn test_string_like_overloads_second() {
        let ty = widget(vec![
            MemberInfo::method(1, "SetText", &[TypeRef::named("System.Text.StringBuilder")], TypeRef::Void),
            MemberInfo::method(2, "SetText", &[TypeRef::array_of(TypeRef::String)], TypeRef::Void),
            MemberInfo::method(3, "set_TEXT", &[TypeRef::named("Il2CppString"), TypeRef::Int], TypeRef::Void),
        ]);
        assert_eq!(tokens(setter_candidates(&ty)), vec![1, 3]);
    }

    #[test]
    fn test_any_text_member_last() {
        let ty = widget(vec![
            MemberInfo::method(1, "SetColor", &[TypeRef::named("Color")], TypeRef::Void),
            MemberInfo::method(2, "AppendLabel", &[TypeRef::String], TypeRef::Void),
            MemberInfo::method(3, "Prepend", &[TypeRef::String], TypeRef::Void),
        ]);
        assert_eq!(tokens(setter_candidates(&ty)), vec![2]);
    }

    #[test]
    fn test_no_candidates() {
        let ty = widget(vec![
            MemberInfo::method(1, "SetText", &[TypeRef::array_of(TypeRef::String)], TypeRef::Void),
            MemberInfo::method(2, "SetColor", &[TypeRef::named("Color")], TypeRef::Void),
        ]);
        assert!(setter_candidates(&ty).is_empty());
    }

    #[test]
    fn test_overload_candidates() {
        let ty = widget(vec![
            MemberInfo::method(1, "SetText", &[TypeRef::String], TypeRef::Void),
            MemberInfo::method(2, "SetText", &[TypeRef::named("Il2CppString"), TypeRef::Int], TypeRef::Void),
            MemberInfo::method(3, "SetText", &[TypeRef::Int], TypeRef::Void),
            MemberInfo::method(4, "AppendLabel", &[TypeRef::String], TypeRef::Void),
        ]);
        assert_eq!(tokens(overload_candidates(&ty)), vec![1, 2]);
    }
}
