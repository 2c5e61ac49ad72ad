use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use serenity::{
    Client,
    all::{Context, Ready},
    gateway::ShardManager,
    model::prelude::GatewayIntents,
};

use crate::{
    dispatch::{CommandEvent, ComponentEvent, Dispatcher, Shared},
    error::{Error, Result},
    events::{EventArgs, EventBinder, EventSource},
    loader::{self, LoadReport},
    lua::ScriptHost,
    presence::{Activity, PresenceHandle, PresenceRotator, PresenceStatus},
    registry::{DescriptorHandler, HandlerDescriptor, HandlerFuture, Registry, handler_fn},
    variable::{self, Variable, VariableOptions},
};

pub type ReadyCallback = Box<dyn FnOnce(Context, Ready) -> HandlerFuture + Send>;

/// Everything needed to construct a [`Bot`].
#[derive(Debug, Clone)]
pub struct BotOptions {
    pub token: String,
    pub prefix: String,
    pub intents: GatewayIntents,
    pub variable: VariableOptions,
    /// Where custom event descriptors are looked up.
    pub events_dir: PathBuf,
}
impl BotOptions {
    pub fn new(token: impl Into<String>, prefix: impl Into<String>, intents: GatewayIntents) -> Self {
        Self {
            token: token.into(),
            prefix: prefix.into(),
            intents,
            variable: VariableOptions::default(),
            events_dir: PathBuf::from("events"),
        }
    }

    pub fn variable(mut self, variable: VariableOptions) -> Self {
        self.variable = variable;
        self
    }

    pub fn events_dir(mut self, events_dir: impl Into<PathBuf>) -> Self {
        self.events_dir = events_dir.into();
        self
    }
}

/// Stops a running bot from anywhere: halts the presence rotation and shuts
/// every shard down. Does nothing before the bot has started.
#[derive(Clone, Default)]
pub struct KillSwitch {
    inner: Arc<KillState>,
}

#[derive(Default)]
struct KillState {
    shard_manager: Mutex<Option<Arc<ShardManager>>>,
    presence: Mutex<Option<PresenceHandle>>,
}

impl KillSwitch {
    pub async fn kill(&self) {
        let presence = self.inner.presence.lock().take();
        if let Some(presence) = presence {
            presence.stop();
        }
        let shard_manager = self.inner.shard_manager.lock().clone();
        if let Some(shard_manager) = shard_manager {
            tracing::info!("shutting down");
            shard_manager.shutdown_all().await;
        }
    }

    pub fn is_armed(&self) -> bool {
        self.inner.shard_manager.lock().is_some()
    }

    fn arm(&self, shard_manager: Arc<ShardManager>) {
        *self.inner.shard_manager.lock() = Some(shard_manager);
    }

    pub(crate) fn hold_presence(&self, handle: PresenceHandle) {
        if let Some(previous) = self.inner.presence.lock().replace(handle) {
            previous.stop();
        }
    }
}

/// A Discord bot: prefix commands and component interactions dispatched from
/// registries, custom events, and a rotating presence.
///
/// Everything is registered up front; [`Bot::start`] hands the result to
/// serenity and runs until the bot is killed.
pub struct Bot {
    options: BotOptions,
    variable_folder: Option<PathBuf>,
    scripts: ScriptHost,
    commands: Registry<CommandEvent>,
    interactions: Registry<ComponentEvent>,
    events: EventBinder<Context>,
    on_ready: Vec<ReadyCallback>,
    presence: Option<PresenceRotator>,
    route_commands: bool,
    route_interactions: bool,
    kill_switch: KillSwitch,
}

impl Bot {
    pub fn new(options: BotOptions) -> Result<Self> {
        let variable_folder = variable::provision_folder(&options.variable)?;
        let scripts = ScriptHost::new()?;
        let events = EventBinder::new(scripts.clone(), options.events_dir.clone());

        Ok(Self {
            options,
            variable_folder,
            scripts,
            commands: Registry::commands(),
            interactions: Registry::interactions(),
            events,
            on_ready: vec![],
            presence: None,
            route_commands: false,
            route_interactions: false,
            kill_switch: KillSwitch::default(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.options.prefix
    }

    pub fn scripts(&self) -> &ScriptHost {
        &self.scripts
    }

    pub fn commands(&self) -> &Registry<CommandEvent> {
        &self.commands
    }

    pub fn interactions(&self) -> &Registry<ComponentEvent> {
        &self.interactions
    }

    pub fn variable_folder(&self) -> Option<&Path> {
        self.variable_folder.as_deref()
    }

    /// Registers a prefix command. Names are case-insensitive.
    pub fn command<F, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(CommandEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.commands.register(name, handler_fn(handler));
    }

    /// Registers a handler for the component with custom id `id`.
    pub fn interaction<F, Fut>(&mut self, id: &str, handler: F)
    where
        F: Fn(ComponentEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.interactions.register(id, handler_fn(handler));
    }

    pub fn register(&mut self, descriptor: HandlerDescriptor<CommandEvent, ComponentEvent>) {
        match descriptor.handler {
            DescriptorHandler::Command(handler) => {
                self.commands.register(&descriptor.name, handler);
            }
            DescriptorHandler::Interaction(handler) => {
                self.interactions.register(&descriptor.name, handler);
            }
        }
    }

    /// Loads every handler script under `path`. See
    /// [`loader::load_directory`].
    pub fn handler(&mut self, path: impl AsRef<Path>, show_load: bool) -> Result<LoadReport> {
        loader::load_directory(
            &self.scripts,
            path.as_ref(),
            &mut self.commands,
            &mut self.interactions,
            show_load,
        )
    }

    /// Attaches `callback` to a custom event from the events directory or to
    /// a native gateway event.
    pub fn event<F, Fut>(&mut self, name: &str, callback: F) -> Result<EventSource>
    where
        F: Fn(EventArgs<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.events.bind(name, handler_fn(callback))
    }

    /// Rotates through `activities` every `interval` once the bot is ready.
    pub fn presence(
        &mut self,
        interval: Duration,
        activities: Vec<Activity>,
        status: Option<PresenceStatus>,
    ) -> Result<()> {
        self.presence = Some(PresenceRotator::new(
            interval,
            activities,
            status.unwrap_or_default(),
        )?);
        Ok(())
    }

    /// Runs `callback` once, on the first ready signal.
    pub fn ready<F, Fut>(&mut self, callback: F)
    where
        F: FnOnce(Context, Ready) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_ready
            .push(Box::new(move |ctx: Context, ready: Ready| -> HandlerFuture {
                Box::pin(callback(ctx, ready))
            }));
    }

    /// Starts routing prefixed messages to registered commands.
    pub fn register_commands(&mut self) {
        self.route_commands = true;
    }

    /// Starts routing button and select-menu interactions to registered
    /// interaction handlers.
    pub fn register_interactions(&mut self) {
        self.route_interactions = true;
    }

    pub fn set_max_listeners(&mut self, max: usize) {
        self.events.set_max_listeners(max);
    }

    pub fn new_variable(&self, name: &str, value: serde_json::Value) -> Result<Variable> {
        let folder = self
            .variable_folder
            .as_deref()
            .ok_or(Error::VariableFolderUnset)?;
        Variable::create(name, value, folder)
    }

    pub fn kill_switch(&self) -> KillSwitch {
        self.kill_switch.clone()
    }

    /// Freezes everything registered so far into what the dispatcher reads.
    pub(crate) fn into_shared(self) -> (BotOptions, Shared) {
        let Bot {
            options,
            commands,
            interactions,
            events,
            on_ready,
            presence,
            route_commands,
            route_interactions,
            kill_switch,
            ..
        } = self;

        let shared = Shared {
            prefix: options.prefix.clone(),
            commands,
            interactions,
            events,
            route_commands,
            route_interactions,
            on_ready: Mutex::new(on_ready),
            presence: Mutex::new(presence),
            kill_switch,
        };
        (options, shared)
    }

    /// Connects to the gateway and dispatches events until killed.
    pub async fn start(self) -> Result<()> {
        let kill_switch = self.kill_switch.clone();
        let (options, shared) = self.into_shared();

        tracing::info!(
            commands = shared.commands.len(),
            interactions = shared.interactions.len(),
            "starting with prefix {:?}",
            options.prefix
        );

        let mut client = Client::builder(&options.token, options.intents)
            .event_handler(Dispatcher::new(Arc::new(shared)))
            .await?;
        kill_switch.arm(client.shard_manager.clone());

        client.start().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use serenity::all::{ComponentInteractionDataKind, Message};

    use super::*;
    use crate::{
        error::ErrorKind,
        registry::{Handler, HandlerKind},
    };

    fn bot() -> Bot {
        Bot::new(BotOptions::new("token", "!", GatewayIntents::non_privileged())).unwrap()
    }

    #[test]
    fn registers_commands_case_insensitively() {
        let mut bot = bot();
        bot.command("Ping", |_| async { Ok::<_, anyhow::Error>(()) });
        bot.interaction("Confirm", |_| async { Ok::<_, anyhow::Error>(()) });

        assert!(bot.commands().contains("ping"));
        assert!(bot.interactions().contains("Confirm"));
        assert!(!bot.interactions().contains("confirm"));
    }

    #[test]
    fn descriptors_land_in_the_matching_registry() {
        let mut bot = bot();
        let command = HandlerDescriptor::command("hello", handler_fn(|_| async { Ok::<_, anyhow::Error>(()) }));
        let interaction =
            HandlerDescriptor::interaction("confirm", handler_fn(|_| async { Ok::<_, anyhow::Error>(()) }));
        assert_eq!(command.kind(), HandlerKind::Command);

        bot.register(command);
        bot.register(interaction);
        assert!(bot.commands().contains("hello"));
        assert!(bot.interactions().contains("confirm"));
    }

    #[test]
    fn empty_presence_is_rejected_immediately() {
        let mut bot = bot();
        let err = bot
            .presence(Duration::from_secs(10), vec![], None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidActivities));
    }

    #[test]
    fn unknown_event_names_fail_to_bind() {
        let dir = tempfile::tempdir().unwrap();
        let mut bot = Bot::new(
            BotOptions::new("token", "!", GatewayIntents::non_privileged())
                .events_dir(dir.path()),
        )
        .unwrap();

        assert!(bot.event("messageDelete", |_| async { Ok::<_, anyhow::Error>(()) }).is_ok());
        let err = bot.event("notAnEvent", |_| async { Ok::<_, anyhow::Error>(()) }).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Binding);
    }

    #[test]
    fn variables_need_a_folder() {
        let bot = bot();
        assert!(matches!(
            bot.new_variable("count", json!(0)),
            Err(Error::VariableFolderUnset)
        ));
    }

    #[test]
    fn variables_are_created_in_the_configured_folder() {
        let dir = tempfile::tempdir().unwrap();
        let bot = Bot::new(
            BotOptions::new("token", "!", GatewayIntents::non_privileged()).variable(
                VariableOptions {
                    enabled: true,
                    folder: Some(dir.path().to_path_buf()),
                },
            ),
        )
        .unwrap();

        let variable = bot.new_variable("count", json!(3)).unwrap();
        assert_eq!(variable.get().unwrap(), json!(3));
        assert_eq!(bot.variable_folder(), Some(dir.path()));
    }

    fn message(content: &str) -> Message {
        let mut message = Message::default();
        message.content = content.to_string();
        message
    }

    fn routing_bot() -> (Bot, Handler<CommandEvent>) {
        let mut bot = bot();
        let ping = handler_fn(|_: CommandEvent| async { Ok::<_, anyhow::Error>(()) });
        bot.register(HandlerDescriptor::command("ping", ping.clone()));
        bot.command("pong", |_| async { Ok::<_, anyhow::Error>(()) });
        bot.interaction("confirm", |_| async { Ok::<_, anyhow::Error>(()) });
        (bot, ping)
    }

    #[test]
    fn prefixed_messages_route_to_their_command() {
        let (mut bot, ping) = routing_bot();
        bot.register_commands();
        let (_, shared) = bot.into_shared();

        let (handler, invocation) = shared.command_for(&message("!PING now")).unwrap();
        assert!(Arc::ptr_eq(&handler, &ping));
        assert_eq!(invocation.name, "ping");
        assert_eq!(invocation.args, vec!["now".to_string()]);

        assert!(shared.command_for(&message("!unknown")).is_none());
    }

    #[test]
    fn automated_or_unprefixed_messages_route_nowhere() {
        let (mut bot, _) = routing_bot();
        bot.register_commands();
        let (_, shared) = bot.into_shared();

        assert!(shared.command_for(&message("ping")).is_none());

        let mut from_bot = message("!ping");
        from_bot.author.bot = true;
        assert!(shared.command_for(&from_bot).is_none());

        let mut from_webhook = message("!ping");
        from_webhook.webhook_id = Some(serenity::all::WebhookId::new(1));
        assert!(shared.command_for(&from_webhook).is_none());
    }

    #[test]
    fn nothing_routes_until_enabled() {
        let (bot, _) = routing_bot();
        let (_, shared) = bot.into_shared();

        assert!(shared.command_for(&message("!ping")).is_none());
        assert!(
            shared
                .interaction_for("confirm", &ComponentInteractionDataKind::Button)
                .is_none()
        );
    }

    #[test]
    fn routable_components_route_by_custom_id() {
        let (mut bot, _) = routing_bot();
        bot.register_interactions();
        let (_, shared) = bot.into_shared();

        assert!(
            shared
                .interaction_for("confirm", &ComponentInteractionDataKind::Button)
                .is_some()
        );
        assert!(
            shared
                .interaction_for("Confirm", &ComponentInteractionDataKind::Button)
                .is_none()
        );
        assert!(
            shared
                .interaction_for(
                    "confirm",
                    &ComponentInteractionDataKind::RoleSelect { values: vec![] }
                )
                .is_none()
        );
        // Interactions alone leave commands off
        assert!(shared.command_for(&message("!ping")).is_none());
    }

    #[tokio::test]
    async fn kill_before_start_is_a_no_op() {
        let bot = bot();
        let kill_switch = bot.kill_switch();
        assert!(!kill_switch.is_armed());
        kill_switch.kill().await;
    }
}
