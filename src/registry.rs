use std::{collections::HashMap, future::Future, sync::Arc};

use serenity::futures::future::BoxFuture;

pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A registered handler. Cloning is cheap; dispatch clones it out of the
/// registry and runs it on its own task.
pub type Handler<T> = Arc<dyn Fn(T) -> HandlerFuture + Send + Sync>;

/// Wraps an async closure into a [`Handler`].
pub fn handler_fn<T, F, Fut>(f: F) -> Handler<T>
where
    T: 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |arg: T| -> HandlerFuture { Box::pin(f(arg)) })
}

/// Which registry a handler belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Command,
    Interaction,
}
impl HandlerKind {
    /// Classifies a script's declared `type`. Anything other than
    /// `"interaction"` (including nothing at all) is a command.
    pub fn from_declared(declared: Option<&str>) -> Self {
        match declared {
            Some("interaction") => Self::Interaction,
            _ => Self::Command,
        }
    }
}

/// A handler together with where it should be registered, so Rust code can
/// hand the bot the same shape a script file declares.
pub struct HandlerDescriptor<C, I> {
    pub name: String,
    pub handler: DescriptorHandler<C, I>,
}

pub enum DescriptorHandler<C, I> {
    Command(Handler<C>),
    Interaction(Handler<I>),
}

impl<C, I> HandlerDescriptor<C, I> {
    pub fn command(name: impl Into<String>, handler: Handler<C>) -> Self {
        Self {
            name: name.into(),
            handler: DescriptorHandler::Command(handler),
        }
    }

    pub fn interaction(name: impl Into<String>, handler: Handler<I>) -> Self {
        Self {
            name: name.into(),
            handler: DescriptorHandler::Interaction(handler),
        }
    }

    pub fn kind(&self) -> HandlerKind {
        match self.handler {
            DescriptorHandler::Command(_) => HandlerKind::Command,
            DescriptorHandler::Interaction(_) => HandlerKind::Interaction,
        }
    }
}

/// Name -> handler table. Command registries fold names to lowercase on both
/// insert and lookup; interaction registries match identifiers exactly.
pub struct Registry<T> {
    case_insensitive: bool,
    entries: HashMap<String, Handler<T>>,
}

impl<T> Registry<T> {
    pub fn commands() -> Self {
        Self {
            case_insensitive: true,
            entries: HashMap::new(),
        }
    }

    pub fn interactions() -> Self {
        Self {
            case_insensitive: false,
            entries: HashMap::new(),
        }
    }

    fn key(&self, name: &str) -> String {
        if self.case_insensitive {
            name.to_lowercase()
        } else {
            name.to_string()
        }
    }

    /// Stores `handler` under `name`. Last registration wins; the replaced
    /// handler, if any, is returned.
    pub fn register(&mut self, name: &str, handler: Handler<T>) -> Option<Handler<T>> {
        let key = self.key(name);
        let previous = self.entries.insert(key.clone(), handler);
        if previous.is_some() {
            tracing::debug!(name = %key, "replaced existing handler");
        }
        previous
    }

    pub fn lookup(&self, name: &str) -> Option<Handler<T>> {
        if self.case_insensitive {
            self.entries.get(&name.to_lowercase()).cloned()
        } else {
            self.entries.get(name).cloned()
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(tag: &'static str, out: flume::Sender<&'static str>) -> Handler<()> {
        handler_fn(move |_| {
            let out = out.clone();
            async move {
                out.send(tag)?;
                Ok::<_, anyhow::Error>(())
            }
        })
    }

    #[tokio::test]
    async fn lookup_returns_registered_handler() {
        let (tx, rx) = flume::unbounded();
        let mut registry = Registry::commands();
        registry.register("ping", tagged("ping", tx));

        let handler = registry.lookup("ping").expect("ping is registered");
        handler(()).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), "ping");
        assert!(registry.lookup("pong").is_none());
    }

    #[tokio::test]
    async fn command_names_are_case_insensitive_and_last_write_wins() {
        let (tx, rx) = flume::unbounded();
        let mut registry = Registry::commands();
        assert!(registry.register("Ping", tagged("first", tx.clone())).is_none());
        assert!(registry.register("PING", tagged("second", tx)).is_some());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["ping"]);

        registry.lookup("pInG").unwrap()(()).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), "second");
    }

    #[test]
    fn interaction_ids_match_exactly() {
        let (tx, _rx) = flume::unbounded();
        let mut registry = Registry::interactions();
        registry.register("Confirm", tagged("confirm", tx));

        assert!(registry.contains("Confirm"));
        assert!(!registry.contains("confirm"));
    }

    #[test]
    fn declared_kind_defaults_to_command() {
        assert_eq!(HandlerKind::from_declared(None), HandlerKind::Command);
        assert_eq!(
            HandlerKind::from_declared(Some("command")),
            HandlerKind::Command
        );
        assert_eq!(
            HandlerKind::from_declared(Some("slash")),
            HandlerKind::Command
        );
        assert_eq!(
            HandlerKind::from_declared(Some("interaction")),
            HandlerKind::Interaction
        );
    }

    #[test]
    fn descriptor_reports_its_kind() {
        let (tx, _rx) = flume::unbounded();
        let descriptor: HandlerDescriptor<(), ()> =
            HandlerDescriptor::interaction("confirm", tagged("confirm", tx));
        assert_eq!(descriptor.kind(), HandlerKind::Interaction);
    }
}
