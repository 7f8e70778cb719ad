//! Ranked member queries.
//!
//! A query is a name/shape predicate over [`MemberInfo`]. Discovery asks a
//! type for the members matching an ordered list of queries; the order is a
//! tunable policy, not a guarantee of finding the real text accessor.

use smallvec::SmallVec;

use crate::host::{CallShape, MemberInfo, MemberKind, TypeInfo, TypeRef};
use crate::util::contains_ignore_case;

/// One predicate of a ranking.
pub struct MemberQuery {
    pub label: &'static str,
    pub shape: CallShape,
    matches: fn(&MemberInfo) -> bool,
}

impl MemberQuery {
    pub const fn new(label: &'static str, shape: CallShape, matches: fn(&MemberInfo) -> bool) -> Self {
        Self { label, shape, matches }
    }

    #[inline]
    pub fn matches(&self, member: &MemberInfo) -> bool {
        (self.matches)(member)
    }
}

impl std::fmt::Debug for MemberQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberQuery")
            .field("label", &self.label)
            .field("shape", &self.shape)
            .finish()
    }
}

fn takes_single_int(m: &MemberInfo) -> bool {
    m.params.len() == 1 && m.params[0] == TypeRef::Int
}

fn strings_accessor(m: &MemberInfo) -> bool {
    m.returns.is_string_array()
        && (contains_ignore_case(&m.name, "get_strings") || contains_ignore_case(&m.name, "GetStrings"))
}

fn get_text_by_index(m: &MemberInfo) -> bool {
    m.returns.is_string() && m.is_named("GetText") && takes_single_int(m)
}

fn get_text(m: &MemberInfo) -> bool {
    m.returns.is_string() && m.is_named("GetText") && m.params.is_empty()
}

fn string_getter(m: &MemberInfo) -> bool {
    matches!(m.kind, MemberKind::Getter { .. }) && m.returns.is_string()
}

fn string_by_index(m: &MemberInfo) -> bool {
    m.returns.is_string() && takes_single_int(m)
}

fn string_no_args(m: &MemberInfo) -> bool {
    m.returns.is_string() && m.params.is_empty()
}

fn any_string(m: &MemberInfo) -> bool {
    m.returns.is_string()
}

fn any_string_array(m: &MemberInfo) -> bool {
    m.returns.is_string_array()
}

/// Preference order for the primary text accessor of a string-table type.
pub static PRIMARY_RANKING: [MemberQuery; 8] = [
    MemberQuery::new("strings accessor", CallShape::StringArray, strings_accessor),
    MemberQuery::new("GetText(int)", CallShape::SingleString, get_text_by_index),
    MemberQuery::new("GetText()", CallShape::SingleString, get_text),
    MemberQuery::new("string property getter", CallShape::SingleString, string_getter),
    MemberQuery::new("string method (int)", CallShape::SingleString, string_by_index),
    MemberQuery::new("string method ()", CallShape::SingleString, string_no_args),
    MemberQuery::new("any string method", CallShape::SingleString, any_string),
    MemberQuery::new("any string array method", CallShape::StringArray, any_string_array),
];

/// First member matching the highest ranked query.
pub fn first_match<'a, 'q>(
    members: &'a [MemberInfo],
    ranking: &'q [MemberQuery],
) -> Option<(&'a MemberInfo, &'q MemberQuery)> {
    ranking
        .iter()
        .find_map(|query| members.iter().find(|m| query.matches(m)).map(|m| (m, query)))
}

/// Every matching member in rank order, each member listed once under its
/// best query.
pub fn ranked_matches<'a, 'q>(
    ty: &'a TypeInfo,
    ranking: &'q [MemberQuery],
) -> SmallVec<[(&'a MemberInfo, &'q MemberQuery); 8]> {
    let mut out: SmallVec<[(&MemberInfo, &MemberQuery); 8]> = SmallVec::new();
    for query in ranking {
        for member in ty.members.iter().filter(|m| query.matches(m)) {
            if !out.iter().any(|(seen, _)| seen.token == member.token) {
                out.push((member, query));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(members: Vec<MemberInfo>) -> TypeInfo {
        TypeInfo {
            full_name: "Scriptable_String".to_string(),
            members,
        }
    }

    fn best(members: &[MemberInfo]) -> Option<(u64, &'static str)> {
        first_match(members, &PRIMARY_RANKING).map(|(m, q)| (m.token, q.label))
    }

    #[test]
    fn test_strings_accessor_preferred() {
        let members = vec![
            MemberInfo::method(1, "GetText", &[TypeRef::Int], TypeRef::String),
            MemberInfo::getter(2, "strings", TypeRef::named("Il2CppStringArray")),
        ];
        assert_eq!(best(&members), Some((2, "strings accessor")));
    }

    #[test]
    fn test_get_text_overloads_order() {
        let members = vec![
            MemberInfo::method(1, "GetText", &[], TypeRef::String),
            MemberInfo::method(2, "gettext", &[TypeRef::Int], TypeRef::String),
        ];
        assert_eq!(best(&members), Some((2, "GetText(int)")));
        assert_eq!(best(&members[..1]), Some((1, "GetText()")));
    }

    #[test]
    fn test_property_getter_before_generic_methods() {
        let members = vec![
            MemberInfo::method(1, "Describe", &[TypeRef::Int], TypeRef::String),
            MemberInfo::getter(2, "Text", TypeRef::String),
        ];
        assert_eq!(best(&members), Some((2, "string property getter")));
    }

    #[test]
    fn test_generic_fallbacks() {
        let by_index = vec![
            MemberInfo::method(1, "Format", &[TypeRef::String], TypeRef::String),
            MemberInfo::method(2, "Describe", &[TypeRef::Int], TypeRef::String),
        ];
        assert_eq!(best(&by_index), Some((2, "string method (int)")));

        let no_args = vec![
            MemberInfo::method(1, "Format", &[TypeRef::String], TypeRef::String),
            MemberInfo::method(2, "ToString", &[], TypeRef::String),
        ];
        assert_eq!(best(&no_args), Some((2, "string method ()")));

        let any = vec![MemberInfo::method(1, "Format", &[TypeRef::String], TypeRef::String)];
        assert_eq!(best(&any), Some((1, "any string method")));

        let arrays = vec![
            MemberInfo::method(1, "Count", &[], TypeRef::Int),
            MemberInfo::method(2, "All", &[], TypeRef::array_of(TypeRef::String)),
        ];
        assert_eq!(best(&arrays), Some((2, "any string array method")));
    }

    #[test]
    fn test_no_text_members() {
        let members = vec![
            MemberInfo::method(1, "Count", &[], TypeRef::Int),
            MemberInfo::setter(2, "text", TypeRef::String),
        ];
        assert_eq!(best(&members), None);
    }

    #[test]
    fn test_ranked_matches_lists_each_member_once() {
        let t = ty(vec![
            MemberInfo::method(1, "ToString", &[], TypeRef::String),
            MemberInfo::method(2, "GetText", &[TypeRef::Int], TypeRef::String),
            MemberInfo::method(3, "Count", &[], TypeRef::Int),
        ]);
        let ranked: Vec<(u64, &str)> = ranked_matches(&t, &PRIMARY_RANKING)
            .iter()
            .map(|(m, q)| (m.token, q.label))
            .collect();
        assert_eq!(ranked, vec![(2, "GetText(int)"), (1, "string method ()")]);
    }
}
