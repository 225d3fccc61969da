/// Identifies one scope created by a [`Scope`] tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

#[derive(Debug, Clone)]
struct Level {
    id: ScopeId,
    /// Variables live in this scope only.
    vars: u32,
    /// Variables ever allocated in this scope.
    allocated: u32,
}

/// What an exited scope did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitedScope {
    pub id: ScopeId,
    pub allocated: u32,
}

/// Tracks nested variable scopes during a single linear pass over ops.
///
/// Only the innermost scope is active. Entering creates a child of it;
/// exiting releases the child's variables and retires it for good. Register
/// indices are contiguous: a new variable gets the number of variables live
/// across the whole chain.
#[derive(Debug, Clone)]
pub struct Scope {
    levels: Vec<Level>,
    next_id: u32,
    live: u32,
    max_vars: u32,
    max_depth: u32,
    guard_depth: u32,
    guard_all_depth: u32,
}

impl Scope {
    /// A root scope with `params` variables already allocated.
    pub fn new(params: u32) -> Self {
        Self {
            levels: vec![Level {
                id: ScopeId(0),
                vars: params,
                allocated: params,
            }],
            next_id: 1,
            live: params,
            max_vars: params,
            max_depth: 1,
            guard_depth: 0,
            guard_all_depth: 0,
        }
    }

    pub fn active(&self) -> ScopeId {
        self.leaf().id
    }

    /// Nesting depth; the root scope is at depth 1.
    pub fn depth(&self) -> u32 {
        self.levels.len() as u32
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// The most variables ever live at once.
    pub fn max_vars(&self) -> u32 {
        self.max_vars
    }

    pub fn live_vars(&self) -> u32 {
        self.live
    }

    pub fn guard_depth(&self) -> u32 {
        self.guard_depth
    }

    pub fn guard_all_depth(&self) -> u32 {
        self.guard_all_depth
    }

    pub fn is_exited(&self, id: ScopeId) -> bool {
        id.0 < self.next_id && !self.levels.iter().any(|l| l.id == id)
    }

    pub fn enter(&mut self) -> ScopeId {
        let id = ScopeId(self.next_id);
        self.next_id += 1;
        self.levels.push(Level {
            id,
            vars: 0,
            allocated: 0,
        });
        self.max_depth = self.max_depth.max(self.depth());
        id
    }

    /// Enter a child of `parent`.
    ///
    /// # Panics
    ///
    /// If `parent` has exited or is not the innermost scope.
    pub fn enter_from(&mut self, parent: ScopeId) -> ScopeId {
        self.check_active(parent);
        self.enter()
    }

    /// # Panics
    ///
    /// When only the root scope is left.
    pub fn exit(&mut self) -> ExitedScope {
        let level = match self.levels.pop() {
            Some(level) if !self.levels.is_empty() => level,
            _ => panic!("cannot exit the root scope"),
        };
        self.live -= level.vars;
        ExitedScope {
            id: level.id,
            allocated: level.allocated,
        }
    }

    /// Allocate a variable in the innermost scope, returning its register
    /// index.
    pub fn alloc_var(&mut self) -> u32 {
        let index = self.live;
        self.live += 1;
        self.max_vars = self.max_vars.max(self.live);
        let leaf = self.leaf_mut();
        leaf.vars += 1;
        leaf.allocated += 1;
        index
    }

    /// # Panics
    ///
    /// If `scope` has exited or is not the innermost scope.
    pub fn alloc_var_in(&mut self, scope: ScopeId) -> u32 {
        self.check_active(scope);
        self.alloc_var()
    }

    /// Make sure register `index` is allocated, for ops whose registers
    /// were numbered when they were written.
    pub fn ensure_var(&mut self, index: u32) {
        while self.live <= index {
            self.alloc_var();
        }
    }

    pub fn enter_guard(&mut self) {
        self.guard_depth += 1;
    }

    pub fn exit_guard(&mut self) {
        assert!(self.guard_depth > 0, "guard exit without a matching guard");
        self.guard_depth -= 1;
    }

    pub fn enter_guard_all(&mut self) {
        self.guard_all_depth += 1;
    }

    pub fn exit_guard_all(&mut self) {
        assert!(
            self.guard_all_depth > 0,
            "finally exit without a matching guard-all"
        );
        self.guard_all_depth -= 1;
    }

    fn check_active(&self, id: ScopeId) {
        assert!(!self.is_exited(id), "scope {} has already exited", id.0);
        assert!(self.active() == id, "scope {} is not the innermost scope", id.0);
    }

    fn leaf(&self) -> &Level {
        &self.levels[self.levels.len() - 1]
    }

    fn leaf_mut(&mut self) -> &mut Level {
        let last = self.levels.len() - 1;
        &mut self.levels[last]
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new(0)
    }
}
