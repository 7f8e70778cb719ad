//! In-process host.
//!
//! Holds types, assemblies, installed hooks and text widgets in memory.
//! Drives the integration tests and the rehearsal binary. Hooks run exactly
//! as a real patcher would run them: postfixes see the value returned by a
//! call, prefixes see its arguments.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};

use super::{
    CandidateCallSite, CallSiteKey, Hook, HostValue, ObjectHandle, Patcher, SceneGraph, TypeInfo,
    TypeRegistry,
};
use crate::error::HostError;
use crate::util::eq_ignore_case;

#[derive(Debug, Clone)]
struct Widget {
    type_name: String,
    text: Option<String>,
    broken: bool,
}

struct Pending {
    remaining: u32,
    assembly: Option<String>,
    ty: TypeInfo,
}

#[derive(Default)]
pub struct MemoryHost {
    global: RwLock<HashMap<String, TypeInfo>>,
    assemblies: RwLock<BTreeMap<String, HashMap<String, TypeInfo>>>,
    pending: Mutex<Vec<Pending>>,
    failing: RwLock<HashSet<String>>,
    hooks: RwLock<HashMap<CallSiteKey, Vec<Hook>>>,
    installed: Mutex<Vec<CandidateCallSite>>,
    refuse_patches: AtomicBool,
    widgets: Mutex<BTreeMap<u64, Widget>>,
    next_id: AtomicU64,
    scene_broken: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type reachable by global lookup.
    pub fn add_type(&self, ty: TypeInfo) {
        self.global
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(ty.full_name.clone(), ty);
    }

    /// Registers a type reachable only through its assembly.
    pub fn add_type_to_assembly(&self, assembly: &str, ty: TypeInfo) {
        self.assemblies
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(assembly.to_string())
            .or_default()
            .insert(ty.full_name.clone(), ty);
    }

    /// Registers a type that materializes after `lookups` global lookups of
    /// its name have come back empty.
    pub fn add_type_after(&self, lookups: u32, ty: TypeInfo) {
        if lookups == 0 {
            return self.add_type(ty);
        }
        lock(&self.pending).push(Pending {
            remaining: lookups,
            assembly: None,
            ty,
        });
    }

    /// Registers an assembly type that materializes after `lookups` lookups.
    pub fn add_type_to_assembly_after(&self, lookups: u32, assembly: &str, ty: TypeInfo) {
        if lookups == 0 {
            return self.add_type_to_assembly(assembly, ty);
        }
        lock(&self.pending).push(Pending {
            remaining: lookups,
            assembly: Some(assembly.to_string()),
            ty,
        });
    }

    /// Makes every lookup of `name` fail with [`HostError::TypeLoad`].
    pub fn fail_type(&self, name: &str) {
        self.failing
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string());
    }

    pub fn refuse_patches(&self, refuse: bool) {
        self.refuse_patches.store(refuse, Ordering::SeqCst);
    }

    /// Every site a hook was installed on, in install order.
    pub fn installed(&self) -> Vec<CandidateCallSite> {
        lock(&self.installed).clone()
    }

    pub fn is_hooked(&self, owner: &str, token: u64) -> bool {
        self.hooks_for(owner, token).next().is_some()
    }

    fn hooks_for(&self, owner: &str, token: u64) -> std::vec::IntoIter<Hook> {
        let key = CallSiteKey {
            owner: owner.to_string(),
            token,
        };
        self.hooks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned()
            .unwrap_or_default()
            .into_iter()
    }

    /// Simulates a call of member `token` on `owner` that produced `result`.
    /// Returns the value the caller would observe.
    pub fn call(&self, owner: &str, token: u64, mut result: HostValue) -> HostValue {
        for hook in self.hooks_for(owner, token) {
            if let Hook::Postfix(postfix) = hook {
                postfix(&mut result);
            }
        }
        result
    }

    /// Simulates a call of member `token` on `owner` with `args`. Returns the
    /// arguments the original member would receive.
    pub fn call_with_args(&self, owner: &str, token: u64, mut args: Vec<HostValue>) -> Vec<HostValue> {
        for hook in self.hooks_for(owner, token) {
            if let Hook::Prefix(prefix) = hook {
                prefix(&mut args);
            }
        }
        args
    }

    pub fn add_widget(&self, type_name: &str, text: Option<&str>) -> ObjectHandle {
        self.insert_widget(type_name, text, false)
    }

    /// A widget whose text property throws on access.
    pub fn add_broken_widget(&self, type_name: &str) -> ObjectHandle {
        self.insert_widget(type_name, None, true)
    }

    fn insert_widget(&self, type_name: &str, text: Option<&str>, broken: bool) -> ObjectHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.widgets).insert(
            id,
            Widget {
                type_name: type_name.to_string(),
                text: text.map(str::to_string),
                broken,
            },
        );
        ObjectHandle {
            id,
            type_name: type_name.to_string(),
        }
    }

    /// Assigns widget text the way game code does: through the widget
    /// type's text setter, so installed setter prefixes run first.
    pub fn assign_text(&self, widget: &ObjectHandle, text: &str) -> Result<(), HostError> {
        let setter = self.setter_of(&widget.type_name);
        let args = match setter {
            Some(token) => self.call_with_args(&widget.type_name, token, vec![HostValue::from(text)]),
            None => vec![HostValue::from(text)],
        };
        let value = args.first().and_then(HostValue::as_text).map(str::to_string);

        let mut widgets = lock(&self.widgets);
        let entry = widgets
            .get_mut(&widget.id)
            .ok_or(HostError::ObjectGone(widget.id))?;
        entry.text = value;
        Ok(())
    }

    fn setter_of(&self, type_name: &str) -> Option<u64> {
        let global = self.global.read().unwrap_or_else(|e| e.into_inner());
        let assemblies = self.assemblies.read().unwrap_or_else(|e| e.into_inner());
        let ty = global
            .get(type_name)
            .or_else(|| assemblies.values().find_map(|types| types.get(type_name)))?;
        ty.members
            .iter()
            .find(|m| eq_ignore_case(&m.name, "set_text") || eq_ignore_case(&m.name, "SetText"))
            .map(|m| m.token)
    }

    pub fn widget_text(&self, widget: &ObjectHandle) -> Option<String> {
        lock(&self.widgets).get(&widget.id).and_then(|w| w.text.clone())
    }

    pub fn remove_widget(&self, widget: &ObjectHandle) {
        lock(&self.widgets).remove(&widget.id);
    }

    /// Makes [`SceneGraph::live_objects`] fail.
    pub fn break_scene(&self, broken: bool) {
        self.scene_broken.store(broken, Ordering::SeqCst);
    }

    fn promote(&self, name: &str, assembly: Option<&str>) {
        let ready: Vec<Pending> = {
            let mut pending = lock(&self.pending);
            for p in pending.iter_mut() {
                if p.ty.full_name == name && p.assembly.as_deref() == assembly {
                    p.remaining = p.remaining.saturating_sub(1);
                }
            }
            let (ready, waiting) = std::mem::take(&mut *pending)
                .into_iter()
                .partition(|p| p.remaining == 0);
            *pending = waiting;
            ready
        };
        for p in ready {
            match p.assembly {
                Some(asm) => self.add_type_to_assembly(&asm, p.ty),
                None => self.add_type(p.ty),
            }
        }
    }

    fn check_failing(&self, name: &str) -> Result<(), HostError> {
        if self
            .failing
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(name)
        {
            return Err(HostError::TypeLoad(name.to_string()));
        }
        Ok(())
    }
}

impl TypeRegistry for MemoryHost {
    fn find_type(&self, name: &str) -> Result<Option<TypeInfo>, HostError> {
        self.check_failing(name)?;
        let found = self
            .global
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned();
        if found.is_none() {
            self.promote(name, None);
        }
        Ok(found)
    }

    fn assemblies(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .assemblies
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        for asm in lock(&self.pending).iter().filter_map(|p| p.assembly.as_ref()) {
            if !names.contains(asm) {
                names.push(asm.clone());
            }
        }
        names
    }

    fn find_type_in(&self, assembly: &str, name: &str) -> Result<Option<TypeInfo>, HostError> {
        self.check_failing(name)?;
        let found = self
            .assemblies
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(assembly)
            .and_then(|types| types.get(name))
            .cloned();
        if found.is_none() {
            self.promote(name, Some(assembly));
        }
        Ok(found)
    }
}

impl Patcher for MemoryHost {
    fn install(&self, site: &CandidateCallSite, hook: Hook) -> Result<(), HostError> {
        if self.refuse_patches.load(Ordering::SeqCst) {
            return Err(HostError::Patch {
                site: site.to_string(),
                reason: "patching disabled".to_string(),
            });
        }
        self.hooks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(site.key())
            .or_default()
            .push(hook);
        lock(&self.installed).push(site.clone());
        Ok(())
    }
}

impl SceneGraph for MemoryHost {
    fn live_objects(&self) -> Result<Vec<ObjectHandle>, HostError> {
        if self.scene_broken.load(Ordering::SeqCst) {
            return Err(HostError::Other("scene unavailable".to_string()));
        }
        Ok(lock(&self.widgets)
            .iter()
            .map(|(id, w)| ObjectHandle {
                id: *id,
                type_name: w.type_name.clone(),
            })
            .collect())
    }

    fn read_text(&self, object: &ObjectHandle) -> Result<Option<String>, HostError> {
        let widgets = lock(&self.widgets);
        let widget = widgets.get(&object.id).ok_or(HostError::ObjectGone(object.id))?;
        if widget.broken {
            return Err(HostError::Member(format!("{}.text", widget.type_name)));
        }
        Ok(widget.text.clone())
    }

    fn write_text(&self, object: &ObjectHandle, text: &str) -> Result<(), HostError> {
        let mut widgets = lock(&self.widgets);
        let widget = widgets
            .get_mut(&object.id)
            .ok_or(HostError::ObjectGone(object.id))?;
        if widget.broken {
            return Err(HostError::Member(format!("{}.text", widget.type_name)));
        }
        widget.text = Some(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{CallShape, MemberInfo, TypeRef};
    use std::sync::Arc;

    fn label_type() -> TypeInfo {
        TypeInfo {
            full_name: "TMPro.TMP_Text".to_string(),
            members: vec![MemberInfo::setter(4, "text", TypeRef::String)],
        }
    }

    #[test]
    fn test_late_materialization() {
        let host = MemoryHost::new();
        host.add_type_after(2, label_type());

        assert_eq!(host.find_type("TMPro.TMP_Text"), Ok(None));
        assert_eq!(host.find_type("TMPro.TMP_Text"), Ok(None));
        assert!(host.find_type("TMPro.TMP_Text").expect("lookup failed").is_some());
    }

    #[test]
    fn test_assembly_scoped_types() {
        let host = MemoryHost::new();
        host.add_type_to_assembly("Unity.TextMeshPro", label_type());

        assert_eq!(host.find_type("TMPro.TMP_Text"), Ok(None));
        assert_eq!(host.assemblies(), vec!["Unity.TextMeshPro".to_string()]);
        assert!(
            host.find_type_in("Unity.TextMeshPro", "TMPro.TMP_Text")
                .expect("lookup failed")
                .is_some()
        );
    }

    #[test]
    fn test_failing_type() {
        let host = MemoryHost::new();
        host.fail_type("Broken");
        assert!(matches!(host.find_type("Broken"), Err(HostError::TypeLoad(_))));
    }

    #[test]
    fn test_prefix_runs_on_assign() {
        let host = MemoryHost::new();
        host.add_type(label_type());
        let site = CandidateCallSite::new(
            "TMPro.TMP_Text",
            MemberInfo::setter(4, "text", TypeRef::String),
            CallShape::RawCallback,
        );
        let upper: Hook = Hook::Prefix(Arc::new(|args: &mut [HostValue]| {
            if let Some(HostValue::Str(s)) = args.first_mut() {
                *s = s.to_uppercase();
            }
        }));
        host.install(&site, upper).expect("install failed");

        let widget = host.add_widget("TMPro.TMP_Text", None);
        host.assign_text(&widget, "start").expect("assign failed");
        assert_eq!(host.widget_text(&widget).as_deref(), Some("START"));
        assert!(host.is_hooked("TMPro.TMP_Text", 4));
    }

    #[test]
    fn test_scene_errors() {
        let host = MemoryHost::new();
        let broken = host.add_broken_widget("TMPro.TMP_Text");
        assert!(host.read_text(&broken).is_err());

        let gone = host.add_widget("TMPro.TMP_Text", Some("x"));
        host.remove_widget(&gone);
        assert_eq!(host.read_text(&gone), Err(HostError::ObjectGone(gone.id)));

        host.break_scene(true);
        assert!(host.live_objects().is_err());
    }
}
