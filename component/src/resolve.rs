use diagnostics::{ErrorInfo, ErrorListener, Locus, Severity};
use pool::{ConstId, ConstantPool, Format, LinkerContext};

use crate::access::Access;
use crate::tree::{ComponentId, ComponentRef, ComponentTree, Import};

/// Outcome of asking a component what a name means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionResult {
    /// The name does not exist here.
    Unknown,
    /// The name was reported to the collector.
    Resolved,
    /// The name might exist, but that cannot be decided yet.
    Possible,
    /// Resolution hit an inconsistency, which was logged.
    Error,
}

impl ResolutionResult {
    /// Merge the results of two candidate branches. An undecided or failed
    /// result is never lost; otherwise the later result wins.
    pub fn combine(self, that: ResolutionResult) -> ResolutionResult {
        match self {
            ResolutionResult::Possible | ResolutionResult::Error => self,
            _ => that,
        }
    }
}

/// Receives whatever a name resolves to.
pub trait ResolutionCollector {
    /// The name denotes a component (possibly a composite of variants).
    fn resolved_component(&mut self, component: ComponentRef, identity: ConstId) -> ResolutionResult;

    /// The name denotes a constant that has no component of its own.
    fn resolved_constant(&mut self, constant: ConstId) -> ResolutionResult;

    fn error_listener(&mut self) -> &mut dyn ErrorListener;

    /// Where to report resolution problems.
    fn locus(&self) -> Option<Locus> {
        None
    }

    /// When present, conditional variants absent from this context are
    /// ignored.
    fn linker_context(&self) -> Option<&dyn LinkerContext> {
        None
    }
}

/// Remembers the last thing reported to it.
pub struct SimpleCollector<'a> {
    errs: &'a mut dyn ErrorListener,
    ctx: Option<&'a dyn LinkerContext>,
    component: Option<ComponentRef>,
    constant: Option<ConstId>,
}

impl<'a> SimpleCollector<'a> {
    pub fn new(errs: &'a mut dyn ErrorListener) -> Self {
        Self {
            errs,
            ctx: None,
            component: None,
            constant: None,
        }
    }

    pub fn with_context(mut self, ctx: &'a dyn LinkerContext) -> Self {
        self.ctx = Some(ctx);
        self
    }

    /// The resolved constant; for a component, its identity.
    pub fn constant(&self) -> Option<ConstId> {
        self.constant
    }

    pub fn component(&self) -> Option<&ComponentRef> {
        self.component.as_ref()
    }
}

impl ResolutionCollector for SimpleCollector<'_> {
    fn resolved_component(&mut self, component: ComponentRef, identity: ConstId) -> ResolutionResult {
        self.component = Some(component);
        self.constant = Some(identity);
        ResolutionResult::Resolved
    }

    fn resolved_constant(&mut self, constant: ConstId) -> ResolutionResult {
        self.component = None;
        self.constant = Some(constant);
        ResolutionResult::Resolved
    }

    fn error_listener(&mut self) -> &mut dyn ErrorListener {
        &mut *self.errs
    }

    fn linker_context(&self) -> Option<&dyn LinkerContext> {
        self.ctx
    }
}

impl ComponentTree {
    /// Determine what `name` refers to inside the component `id`, as seen
    /// with `access`.
    pub fn resolve_name(
        &self,
        pool: &ConstantPool,
        id: ComponentId,
        name: &str,
        access: Access,
        collector: &mut dyn ResolutionCollector,
    ) -> ResolutionResult {
        match self.get(id).import() {
            Some(Import::Pending) => return ResolutionResult::Possible,
            Some(Import::Linked(module)) => {
                return self.resolve_name(pool, module, name, access, collector);
            }
            None => {}
        }

        let Some(candidates) = self.child_by_name(pool, id, name, collector.linker_context()) else {
            return ResolutionResult::Unknown;
        };
        let candidates = candidates.variants();
        let visible: Vec<ComponentId> = candidates
            .iter()
            .copied()
            .filter(|&c| access.can_see(self.get(c).access()))
            .collect();
        if visible.is_empty() {
            return ResolutionResult::Unknown;
        }
        if visible.len() < candidates.len() {
            return ResolutionResult::Possible;
        }

        let identity = self.get(visible[0]).identity();
        if visible.iter().any(|&c| self.get(c).identity() != identity) {
            let mut err = ErrorInfo::new(
                Severity::Error,
                "NAME_AMBIGUOUS",
                vec![name.to_string(), self.path(pool, id)],
            );
            if let Some(locus) = collector.locus() {
                err = err.at(locus);
            }
            collector.error_listener().log(err);
            return ResolutionResult::Error;
        }

        match self.get(visible[0]).format() {
            Format::Module
            | Format::Package
            | Format::Class
            | Format::Typedef
            | Format::Property
            | Format::MultiMethod => {
                collector.resolved_component(ComponentRef::from_variants(visible), identity)
            }
            _ => ResolutionResult::Unknown,
        }
    }

    /// Resolve `name` in every variant of `target`, merging the answers.
    pub fn resolve_name_in(
        &self,
        pool: &ConstantPool,
        target: &ComponentRef,
        name: &str,
        access: Access,
        collector: &mut dyn ResolutionCollector,
    ) -> ResolutionResult {
        let mut variants = target.variants().iter();
        let Some(&first) = variants.next() else {
            return ResolutionResult::Unknown;
        };
        let mut result = self.resolve_name(pool, first, name, access, collector);
        for &variant in variants {
            result = result.combine(self.resolve_name(pool, variant, name, access, collector));
        }
        result
    }
}
