//! §4.1 — recursive, memoized resolution of the raw catalogue into the
//! canonical, cycle-free registry of bindable [`TypeNode`]s.

use fxhash::{FxHashMap, FxHashSet};
use indexmap::IndexMap;
use log::debug;
use std::sync::Arc;

use crate::error::Result;
use crate::transport::{RawTypeDescriptor, Transport};
use crate::typ::TypeNode;

const POINTER_PREFIX: &str = "pointer to ";
const REFERENCE_PREFIX: &str = "reference to ";

pub struct TypeRegistry {
    resolved: IndexMap<String, Arc<TypeNode>>,
}

impl TypeRegistry {
    /// Fetch the controller's raw type catalogue and resolve it into the
    /// canonical registry. Fails only if the transport fails to deliver the
    /// catalogue or a default-value encoder call fails (§4.1 "Failure
    /// semantics"); individual unresolvable types are silently dropped.
    pub async fn build(transport: &dyn Transport, coordinator: u64) -> Result<Self> {
        let raw = transport.read_and_cache_data_types().await.map_err(|e| e.with_coordinator(coordinator))?;
        let mut working: FxHashMap<String, RawTypeDescriptor> =
            raw.into_iter().map(|(k, v)| (k.to_ascii_lowercase(), v)).collect();
        let mut resolved = IndexMap::new();
        let mut in_progress = FxHashSet::default();
        let names: Vec<String> = working.keys().cloned().collect();
        for name in names {
            if working.contains_key(&name) {
                Self::resolve(transport, &mut working, &mut resolved, &mut in_progress, &name)
                    .map_err(|e| e.with_coordinator(coordinator))?;
            }
        }
        Ok(Self { resolved })
    }

    /// Look up an already-resolved type by its original (not lower-cased)
    /// name.
    pub fn get(&self, name: &str) -> Option<Arc<TypeNode>> {
        self.resolved.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    /// §4.1 steps 1-6, re-entrant and idempotent.
    fn resolve(
        transport: &dyn Transport,
        working: &mut FxHashMap<String, RawTypeDescriptor>,
        resolved: &mut IndexMap<String, Arc<TypeNode>>,
        in_progress: &mut FxHashSet<String>,
        name: &str,
    ) -> Result<Option<Arc<TypeNode>>> {
        let lname = name.to_ascii_lowercase();

        // step 1
        if let Some(existing) = resolved.get(&lname) {
            return Ok(Some(existing.clone()));
        }

        // step 2
        if lname.starts_with(POINTER_PREFIX) || lname.starts_with(REFERENCE_PREFIX) {
            working.remove(&lname);
            return Ok(None);
        }

        // step 3
        let Some(raw) = working.get(&lname).cloned() else { return Ok(None) };

        // cycle guard (§9 "Cyclic / shared type graphs")
        if in_progress.contains(&lname) {
            debug!("type {name} recurses into itself, dropping");
            working.remove(&lname);
            return Ok(None);
        }
        in_progress.insert(lname.clone());

        let result = Self::resolve_body(transport, working, resolved, in_progress, &raw);
        in_progress.remove(&lname);

        match result? {
            Some(node) if node.is_ignored() => {
                debug!("type {name} resolved but is ignored, dropping");
                working.remove(&lname);
                Ok(None)
            }
            Some(node) => {
                let arc = Arc::new(node);
                resolved.insert(lname, arc.clone());
                Ok(Some(arc))
            }
            None => {
                working.remove(&lname);
                Ok(None)
            }
        }
    }

    fn resolve_body(
        transport: &dyn Transport,
        working: &mut FxHashMap<String, RawTypeDescriptor>,
        resolved: &mut IndexMap<String, Arc<TypeNode>>,
        in_progress: &mut FxHashSet<String>,
        raw: &RawTypeDescriptor,
    ) -> Result<Option<TypeNode>> {
        // step 4: parent resolution
        let parent_name = raw.parent_name.trim();
        let has_parent = !parent_name.is_empty()
            && !parent_name.eq_ignore_ascii_case(&raw.name)
            && working
                .get(&parent_name.to_ascii_lowercase())
                .map(|p| p.kind == raw.kind)
                .unwrap_or(false);

        if has_parent {
            return match Self::resolve(transport, working, resolved, in_progress, parent_name)? {
                Some(parent) => parent.extend(transport, raw),
                None => Ok(None),
            };
        }

        // step 5: classify by wire kind
        if let Some(node) = TypeNode::construct_leaf(transport, raw)? {
            return Ok(Some(node));
        }
        if raw.kind == crate::transport::WireKind::Composite {
            return Self::construct_struct(transport, working, resolved, in_progress, raw);
        }
        Ok(None)
    }

    fn construct_struct(
        transport: &dyn Transport,
        working: &mut FxHashMap<String, RawTypeDescriptor>,
        resolved: &mut IndexMap<String, Arc<TypeNode>>,
        in_progress: &mut FxHashSet<String>,
        raw: &RawTypeDescriptor,
    ) -> Result<Option<TypeNode>> {
        if raw.children.is_empty() {
            return Ok(None);
        }
        let mut members = Vec::with_capacity(raw.children.len());
        for child in &raw.children {
            let Some(child_type) =
                Self::resolve(transport, working, resolved, in_progress, &child.type_name)?
            else {
                continue;
            };
            let mutator = crate::transport::RawTypeDescriptor {
                name: child.type_name.clone(),
                parent_name: String::new(),
                kind: child_type.base().ads_kind,
                byte_size: child_type.byte_size(),
                offset: child.offset,
                attributes: child.attributes.clone(),
                children: vec![],
                array_dimensions: vec![],
                enum_fields: None,
                rpc_method_names: vec![],
            };
            if let Some(member) = child_type.clone_with(transport, Some(&mutator))? {
                members.push((arcstr::ArcStr::from(child.member_name.as_str()), Arc::new(member)));
            }
        }
        if members.is_empty() {
            return Ok(None);
        }
        let base = crate::typ::Base::new(
            arcstr::ArcStr::from(raw.name.as_str()),
            raw.kind,
            raw.offset,
            raw.byte_size,
        );
        let rpc_methods: Arc<[arcstr::ArcStr]> =
            raw.rpc_method_names.iter().map(|n| arcstr::ArcStr::from(n.as_str())).collect();
        Ok(Some(TypeNode::Struct(crate::typ::StructType {
            base,
            members: members.into(),
            rpc_methods,
        })))
    }
}

#[cfg(test)] mod test;
