//! Singleton dependency container.
//!
//! Components declare the ordered list of tokens they depend on through
//! [`Injectable::dependencies`] and build themselves from the resolved values in
//! [`Injectable::construct`]. The container turns those declarations into cached
//! singletons:
//!
//! ```text
//! ┌──────────────┬──────────┬──────────────────────────────┬──────────────┐
//! │ Token        │ Binding  │ Slot                         │ Dependencies │
//! ├──────────────┼──────────┼──────────────────────────────┼──────────────┤
//! │ Named(&str)  │ Value    │ value                        │ -            │
//! │ Type(TypeId) │ Class    │ Unresolved/Resolving/Resolved│ Vec<Token>   │
//! └──────────────┴──────────┴──────────────────────────────┴──────────────┘
//! ```
//!
//! Resolving a class whose slot is `Resolving` is a circular dependency and fails
//! immediately. Instances that opt into [`Disposable`] are collected and torn down in
//! construction order by [`Container::dispose`].
//!
//! # Example
//!
//! ```
//! use mirror_core::container::{Container, Dependencies, Injectable, Token};
//! use mirror_core::Result;
//! use std::sync::Arc;
//!
//! struct Greeter {
//!     name: String,
//! }
//!
//! impl Injectable for Greeter {
//!     fn dependencies() -> Vec<Token> {
//!         vec![Token::named("name")]
//!     }
//!
//!     fn construct(deps: &mut Dependencies) -> Result<Arc<Self>> {
//!         Ok(Arc::new(Self { name: deps.next_value::<String>()? }))
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let container = Container::new();
//! container.register_value("name", "mirror".to_string())?;
//! container.register::<Greeter>()?;
//! assert_eq!(container.resolve::<Greeter>()?.name, "mirror");
//! # Ok(())
//! # }
//! ```

use crate::error::{MirrorError, Result};
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type Instance = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&mut Dependencies) -> Result<Constructed> + Send + Sync>;

/// Teardown capability. Components implement this and return themselves from
/// [`Injectable::as_disposable`] to be torn down with the container.
pub trait Disposable: Send + Sync {
    fn dispose(&self);
}

/// A component the container knows how to build.
pub trait Injectable: Send + Sync + Sized + 'static {
    /// Tokens resolved, in order, before [`Injectable::construct`] runs.
    fn dependencies() -> Vec<Token>;

    /// Build the component from its resolved dependencies.
    fn construct(deps: &mut Dependencies) -> Result<Arc<Self>>;

    /// Opt into container teardown.
    fn as_disposable(this: &Arc<Self>) -> Option<Arc<dyn Disposable>> {
        let _ = this;
        None
    }
}

/// Key of a binding.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    /// A class binding keyed by the component type
    Type { id: TypeId, name: &'static str },
    /// A value binding keyed by name
    Named(&'static str),
}

impl Token {
    pub fn of<T: 'static>() -> Self {
        Token::Type {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub const fn named(name: &'static str) -> Self {
        Token::Named(name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Token::Type { name, .. } => name,
            Token::Named(name) => name,
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Type { name, .. } => write!(f, "Type({name})"),
            Token::Named(name) => write!(f, "Named({name})"),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved dependencies handed to [`Injectable::construct`], consumed in declaration order.
pub struct Dependencies {
    resolved: VecDeque<(Token, Instance)>,
}

impl Dependencies {
    /// Take the next dependency as a shared component instance.
    pub fn next<T: Send + Sync + 'static>(&mut self) -> Result<Arc<T>> {
        let (token, instance) = self.pop::<T>()?;
        instance
            .downcast::<T>()
            .map_err(|_| type_mismatch::<T>(&token))
    }

    /// Take the next dependency as a cloned value binding.
    pub fn next_value<T: Clone + Send + Sync + 'static>(&mut self) -> Result<T> {
        let (token, instance) = self.pop::<T>()?;
        instance
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| type_mismatch::<T>(&token))
    }

    pub fn remaining(&self) -> usize {
        self.resolved.len()
    }

    fn pop<T: 'static>(&mut self) -> Result<(Token, Instance)> {
        self.resolved.pop_front().ok_or_else(|| {
            MirrorError::internal(format!(
                "constructor asked for {} past its declared dependencies",
                std::any::type_name::<T>()
            ))
        })
    }
}

struct Constructed {
    instance: Instance,
    disposable: Option<Arc<dyn Disposable>>,
}

enum Slot {
    Unresolved,
    Resolving,
    Resolved(Instance),
}

enum Binding {
    Value(Instance),
    Class {
        dependencies: Vec<Token>,
        factory: Factory,
        slot: Slot,
    },
}

/// Registry and resolver of singleton components.
#[derive(Default)]
pub struct Container {
    store: Mutex<HashMap<Token, Binding>>,
    disposables: Mutex<Vec<Arc<dyn Disposable>>>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a named value.
    pub fn register_value<T: Clone + Send + Sync + 'static>(
        &self,
        name: &'static str,
        value: T,
    ) -> Result<()> {
        self.insert(Token::named(name), Binding::Value(Arc::new(value)))
    }

    /// Bind a component type. It is constructed on first resolution.
    pub fn register<T: Injectable>(&self) -> Result<()> {
        let factory: Factory = Arc::new(|deps: &mut Dependencies| {
            let instance = T::construct(deps)?;
            let disposable = T::as_disposable(&instance);
            Ok(Constructed {
                instance,
                disposable,
            })
        });

        self.insert(
            Token::of::<T>(),
            Binding::Class {
                dependencies: T::dependencies(),
                factory,
                slot: Slot::Unresolved,
            },
        )
    }

    pub fn is_registered(&self, token: &Token) -> bool {
        self.store.lock().contains_key(token)
    }

    /// Resolve the singleton instance of a component type.
    pub fn resolve<T: Injectable>(&self) -> Result<Arc<T>> {
        let token = Token::of::<T>();
        self.resolve_token(&token)?
            .downcast::<T>()
            .map_err(|_| type_mismatch::<T>(&token))
    }

    /// Resolve a named value binding.
    pub fn resolve_value<T: Clone + Send + Sync + 'static>(&self, name: &'static str) -> Result<T> {
        let token = Token::named(name);
        self.resolve_token(&token)?
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| type_mismatch::<T>(&token))
    }

    /// Replace the cached value of an already registered token.
    pub fn override_with(&self, token: Token, value: Arc<dyn Any + Send + Sync>) -> Result<()> {
        let mut store = self.store.lock();
        match store.get_mut(&token) {
            None => Err(MirrorError::UnregisteredDependency(token.to_string())),
            Some(Binding::Value(existing)) => {
                *existing = value;
                Ok(())
            }
            Some(Binding::Class { slot, .. }) => {
                *slot = Slot::Resolved(value);
                Ok(())
            }
        }
    }

    /// Replace a component singleton, typically with a test double.
    pub fn override_instance<T: Injectable>(&self, value: Arc<T>) -> Result<()> {
        self.override_with(Token::of::<T>(), value)
    }

    /// Replace a named value binding.
    pub fn override_value<T: Clone + Send + Sync + 'static>(
        &self,
        name: &'static str,
        value: T,
    ) -> Result<()> {
        self.override_with(Token::named(name), Arc::new(value))
    }

    fn insert(&self, token: Token, binding: Binding) -> Result<()> {
        let mut store = self.store.lock();
        if store.contains_key(&token) {
            return Err(MirrorError::AlreadyRegistered(token.to_string()));
        }
        store.insert(token, binding);
        Ok(())
    }

    fn resolve_token(&self, token: &Token) -> Result<Instance> {
        let (dependencies, factory) = {
            let mut store = self.store.lock();
            match store.get_mut(token) {
                None => return Err(MirrorError::UnregisteredDependency(token.to_string())),
                Some(Binding::Value(value)) => return Ok(value.clone()),
                Some(Binding::Class {
                    slot,
                    dependencies,
                    factory,
                }) => {
                    if let Slot::Resolved(instance) = slot {
                        return Ok(instance.clone());
                    }
                    if matches!(slot, Slot::Resolving) {
                        return Err(MirrorError::CircularDependency(token.to_string()));
                    }
                    *slot = Slot::Resolving;
                    (dependencies.clone(), factory.clone())
                }
            }
        };

        // The store lock is released here: construction resolves dependencies recursively.
        let constructed = self.construct(&dependencies, &factory);

        let mut store = self.store.lock();
        let Some(Binding::Class { slot, .. }) = store.get_mut(token) else {
            return Err(MirrorError::internal(format!("binding for {token} vanished")));
        };

        match constructed {
            Ok(constructed) => {
                debug!(token = %token, "Resolved dependency");
                *slot = Slot::Resolved(constructed.instance.clone());
                if let Some(disposable) = constructed.disposable {
                    self.disposables.lock().push(disposable);
                }
                Ok(constructed.instance)
            }
            Err(e) => {
                *slot = Slot::Unresolved;
                Err(e)
            }
        }
    }

    fn construct(&self, dependencies: &[Token], factory: &Factory) -> Result<Constructed> {
        let mut resolved = VecDeque::with_capacity(dependencies.len());
        for dependency in dependencies {
            resolved.push_back((*dependency, self.resolve_token(dependency)?));
        }
        factory(&mut Dependencies { resolved })
    }
}

impl Disposable for Container {
    fn dispose(&self) {
        let disposables = std::mem::take(&mut *self.disposables.lock());
        debug!(count = disposables.len(), "Disposing container");
        for disposable in disposables {
            disposable.dispose();
        }
    }
}

fn type_mismatch<T>(token: &Token) -> MirrorError {
    MirrorError::TypeMismatch {
        token: token.to_string(),
        expected: std::any::type_name::<T>().to_string(),
    }
}
