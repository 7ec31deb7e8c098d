use std::any::Any;

pub trait BeforeInsertProcessor {
    fn before_insert(&mut self);
}

pub trait AfterInsertProcessor {
    fn after_insert(&mut self);
}

pub trait BeforeUpdateProcessor {
    fn before_update(&mut self);
}

pub trait AfterUpdateProcessor {
    fn after_update(&mut self);
}

pub trait BeforeDeleteProcessor {
    fn before_delete(&mut self);
}

pub trait AfterDeleteProcessor {
    fn after_delete(&mut self);
}

/// Runs on every bean freshly materialized from a row, never on cache hits.
pub trait AfterLoadProcessor {
    fn after_load(&mut self);
}

/// Moment of a bean's life a processor is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    BeforeInsert,
    AfterInsert,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
    AfterLoad,
}

impl Stage {
    pub fn is_before(self) -> bool {
        matches!(
            self,
            Stage::BeforeInsert | Stage::BeforeUpdate | Stage::BeforeDelete
        )
    }
}

/// Processors a bean type opted into, one function pointer per stage.
///
/// Produced by `#[silo(processors(...))]`, types without the attribute use [`Hooks::NONE`].
pub struct Hooks<T> {
    pub before_insert: Option<fn(&mut T)>,
    pub after_insert: Option<fn(&mut T)>,
    pub before_update: Option<fn(&mut T)>,
    pub after_update: Option<fn(&mut T)>,
    pub before_delete: Option<fn(&mut T)>,
    pub after_delete: Option<fn(&mut T)>,
    pub after_load: Option<fn(&mut T)>,
}

impl<T> Hooks<T> {
    pub const NONE: Self = Self {
        before_insert: None,
        after_insert: None,
        before_update: None,
        after_update: None,
        before_delete: None,
        after_delete: None,
        after_load: None,
    };

    pub fn get(&self, stage: Stage) -> Option<fn(&mut T)> {
        match stage {
            Stage::BeforeInsert => self.before_insert,
            Stage::AfterInsert => self.after_insert,
            Stage::BeforeUpdate => self.before_update,
            Stage::AfterUpdate => self.after_update,
            Stage::BeforeDelete => self.before_delete,
            Stage::AfterDelete => self.after_delete,
            Stage::AfterLoad => self.after_load,
        }
    }
}

/// Session scoped closure, receives the bean as `&mut dyn Any`.
pub type Closure = Box<dyn FnMut(&mut dyn Any) + Send>;

/// Closures registered on a session for the next call.
///
/// `before` closures run ahead of the `Before*` type hooks, `after` closures ahead of the
/// `After*` ones, both in registration order.
#[derive(Default)]
pub struct Pipeline {
    before: Vec<Closure>,
    after: Vec<Closure>,
}

impl Pipeline {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn before(&mut self, closure: impl FnMut(&mut dyn Any) + Send + 'static) {
        self.before.push(Box::new(closure));
    }

    pub fn after(&mut self, closure: impl FnMut(&mut dyn Any) + Send + 'static) {
        self.after.push(Box::new(closure));
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }

    /// Runs the closures matching `stage` followed by the type hook.
    pub fn run<T: 'static>(&mut self, stage: Stage, bean: &mut T, hooks: &Hooks<T>) {
        let closures = if stage.is_before() {
            &mut self.before
        } else {
            &mut self.after
        };
        for closure in closures.iter_mut() {
            closure(&mut *bean);
        }
        if let Some(hook) = hooks.get(stage) {
            hook(bean);
        }
    }

    /// Drops every closure, called once the call they were registered for is done.
    pub fn clear(&mut self) {
        self.before.clear();
        self.after.clear();
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .finish()
    }
}
