use std::sync::Arc;

use parking_lot::Mutex;
use serenity::{
    all::{
        ChannelId, ComponentInteraction, ComponentInteractionDataKind, Context, EventHandler,
        Guild, GuildChannel, GuildId, GuildMemberUpdateEvent, Interaction, InviteCreateEvent,
        InviteDeleteEvent, Member, Message, MessageId, MessageUpdateEvent, PartialGuild,
        PartialGuildChannel, Presence, Reaction, Ready, Role, RoleId, TypingStartEvent,
        UnavailableGuild, User, VoiceState,
    },
    async_trait,
};

use crate::{
    client::{KillSwitch, ReadyCallback},
    events::{EventBinder, GatewayEvent, NativeEvent},
    presence::PresenceRotator,
    registry::{Handler, HandlerFuture, Registry},
};

/// A prefixed message that named a registered command.
pub struct CommandEvent {
    pub ctx: Context,
    pub message: Message,
    /// Whitespace-separated words after the command name.
    pub args: Vec<String>,
}

/// A button press or menu selection.
pub struct ComponentEvent {
    pub ctx: Context,
    pub interaction: ComponentInteraction,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Invocation {
    pub name: String,
    pub args: Vec<String>,
}

/// Splits `content` into a lowercased command name and its arguments if it
/// starts with `prefix`.
pub fn parse_invocation(prefix: &str, content: &str) -> Option<Invocation> {
    let rest = content.strip_prefix(prefix)?;
    let mut words = rest.split_whitespace();
    let name = words.next()?.to_lowercase();
    Some(Invocation {
        name,
        args: words.map(str::to_string).collect(),
    })
}

/// Bots and webhooks never trigger commands.
pub fn is_automated(message: &Message) -> bool {
    message.author.bot || message.webhook_id.is_some()
}

/// Only these component kinds are routed to interaction handlers.
pub fn is_routable_component(kind: &ComponentInteractionDataKind) -> bool {
    matches!(
        kind,
        ComponentInteractionDataKind::Button
            | ComponentInteractionDataKind::StringSelect { .. }
            | ComponentInteractionDataKind::UserSelect { .. }
            | ComponentInteractionDataKind::ChannelSelect { .. }
    )
}

/// Everything the dispatcher reads while the client runs. Built once when the
/// bot starts; registries and bindings are never written afterwards.
pub(crate) struct Shared {
    pub prefix: String,
    pub commands: Registry<CommandEvent>,
    pub interactions: Registry<ComponentEvent>,
    pub events: EventBinder<Context>,
    pub route_commands: bool,
    pub route_interactions: bool,
    pub on_ready: Mutex<Vec<ReadyCallback>>,
    pub presence: Mutex<Option<PresenceRotator>>,
    pub kill_switch: KillSwitch,
}

impl Shared {
    /// The command a message invokes, if command routing is on and the
    /// message names a registered command.
    pub fn command_for(&self, message: &Message) -> Option<(Handler<CommandEvent>, Invocation)> {
        if !self.route_commands || is_automated(message) {
            return None;
        }
        let invocation = parse_invocation(&self.prefix, &message.content)?;
        let handler = self.commands.lookup(&invocation.name)?;
        Some((handler, invocation))
    }

    /// The handler for a component with `custom_id`, if interaction routing
    /// is on and the component kind is routable.
    pub fn interaction_for(
        &self,
        custom_id: &str,
        kind: &ComponentInteractionDataKind,
    ) -> Option<Handler<ComponentEvent>> {
        if !self.route_interactions || !is_routable_component(kind) {
            return None;
        }
        self.interactions.lookup(custom_id)
    }
}

pub(crate) struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    pub fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    fn emit(&self, ctx: &Context, event: impl FnOnce() -> GatewayEvent, kind: NativeEvent) {
        if !self.shared.events.has_listeners(kind) {
            return;
        }
        let event = Arc::new(event());
        for future in self.shared.events.dispatch(ctx.clone(), event) {
            spawn_handler("event", kind.to_string(), future);
        }
    }

    fn route_message(&self, ctx: &Context, message: &Message) {
        let Some((handler, invocation)) = self.shared.command_for(message) else {
            return;
        };

        let future = handler(CommandEvent {
            ctx: ctx.clone(),
            message: message.clone(),
            args: invocation.args,
        });
        spawn_handler("command", invocation.name, future);
    }

    fn route_interaction(&self, ctx: &Context, interaction: &Interaction) {
        let Interaction::Component(component) = interaction else {
            return;
        };
        let Some(handler) = self
            .shared
            .interaction_for(&component.data.custom_id, &component.data.kind)
        else {
            return;
        };

        let future = handler(ComponentEvent {
            ctx: ctx.clone(),
            interaction: component.clone(),
        });
        spawn_handler("interaction", component.data.custom_id.clone(), future);
    }
}

/// Runs a handler on its own task; a failure is logged and goes no further.
fn spawn_handler(kind: &'static str, name: String, future: HandlerFuture) {
    tokio::spawn(async move {
        if let Err(err) = future.await {
            tracing::error!(kind, name = %name, "handler failed: {err:?}");
        }
    });
}

#[async_trait]
impl EventHandler for Dispatcher {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!("{} is connected", ready.user.name);

        // Only the first ready fires these; reconnects and extra shards don't
        let callbacks = std::mem::take(&mut *self.shared.on_ready.lock());
        for callback in callbacks {
            spawn_handler("ready", ready.user.name.clone(), callback(ctx.clone(), ready.clone()));
        }

        if let Some(rotator) = self.shared.presence.lock().take() {
            let handle = rotator.spawn(ctx.clone());
            self.shared.kill_switch.hold_presence(handle);
        }

        self.emit(&ctx, || GatewayEvent::Ready(ready), NativeEvent::Ready);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        self.route_message(&ctx, &msg);
        self.emit(&ctx, || GatewayEvent::MessageCreate(msg), NativeEvent::MessageCreate);
    }

    async fn message_update(
        &self,
        ctx: Context,
        old_if_available: Option<Message>,
        new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        self.emit(
            &ctx,
            || GatewayEvent::MessageUpdate {
                old: old_if_available,
                new,
                event,
            },
            NativeEvent::MessageUpdate,
        );
    }

    async fn message_delete_bulk(
        &self,
        ctx: Context,
        channel_id: ChannelId,
        multiple_deleted_messages_ids: Vec<MessageId>,
        guild_id: Option<GuildId>,
    ) {
        self.emit(
            &ctx,
            || GatewayEvent::MessageDeleteBulk {
                channel_id,
                message_ids: multiple_deleted_messages_ids,
                guild_id,
            },
            NativeEvent::MessageDeleteBulk,
        );
    }

    async fn message_delete(
        &self,
        ctx: Context,
        channel_id: ChannelId,
        deleted_message_id: MessageId,
        guild_id: Option<GuildId>,
    ) {
        self.emit(
            &ctx,
            || GatewayEvent::MessageDelete {
                channel_id,
                message_id: deleted_message_id,
                guild_id,
            },
            NativeEvent::MessageDelete,
        );
    }

    async fn reaction_add(&self, ctx: Context, add_reaction: Reaction) {
        self.emit(
            &ctx,
            || GatewayEvent::MessageReactionAdd(add_reaction),
            NativeEvent::MessageReactionAdd,
        );
    }

    async fn reaction_remove(&self, ctx: Context, removed_reaction: Reaction) {
        self.emit(
            &ctx,
            || GatewayEvent::MessageReactionRemove(removed_reaction),
            NativeEvent::MessageReactionRemove,
        );
    }

    async fn reaction_remove_all(
        &self,
        ctx: Context,
        channel_id: ChannelId,
        removed_from_message_id: MessageId,
    ) {
        self.emit(
            &ctx,
            || GatewayEvent::MessageReactionRemoveAll {
                channel_id,
                message_id: removed_from_message_id,
            },
            NativeEvent::MessageReactionRemoveAll,
        );
    }

    async fn reaction_remove_emoji(&self, ctx: Context, removed_reactions: Reaction) {
        self.emit(
            &ctx,
            || GatewayEvent::MessageReactionRemoveEmoji(removed_reactions),
            NativeEvent::MessageReactionRemoveEmoji,
        );
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        self.route_interaction(&ctx, &interaction);
        self.emit(
            &ctx,
            || GatewayEvent::InteractionCreate(interaction),
            NativeEvent::InteractionCreate,
        );
    }

    async fn guild_create(&self, ctx: Context, guild: Guild, is_new: Option<bool>) {
        self.emit(
            &ctx,
            || GatewayEvent::GuildCreate { guild, is_new },
            NativeEvent::GuildCreate,
        );
    }

    async fn guild_update(
        &self,
        ctx: Context,
        old_data_if_available: Option<Guild>,
        new_data: PartialGuild,
    ) {
        self.emit(
            &ctx,
            || GatewayEvent::GuildUpdate {
                old: old_data_if_available,
                new: new_data,
            },
            NativeEvent::GuildUpdate,
        );
    }

    async fn guild_delete(&self, ctx: Context, incomplete: UnavailableGuild, full: Option<Guild>) {
        self.emit(
            &ctx,
            || GatewayEvent::GuildDelete { incomplete, full },
            NativeEvent::GuildDelete,
        );
    }

    async fn guild_member_addition(&self, ctx: Context, new_member: Member) {
        self.emit(
            &ctx,
            || GatewayEvent::GuildMemberAdd(new_member),
            NativeEvent::GuildMemberAdd,
        );
    }

    async fn guild_member_removal(
        &self,
        ctx: Context,
        guild_id: GuildId,
        user: User,
        member_data_if_available: Option<Member>,
    ) {
        self.emit(
            &ctx,
            || GatewayEvent::GuildMemberRemove {
                guild_id,
                user,
                member: member_data_if_available,
            },
            NativeEvent::GuildMemberRemove,
        );
    }

    async fn guild_member_update(
        &self,
        ctx: Context,
        old_if_available: Option<Member>,
        new: Option<Member>,
        event: GuildMemberUpdateEvent,
    ) {
        self.emit(
            &ctx,
            || GatewayEvent::GuildMemberUpdate {
                old: old_if_available,
                new,
                event,
            },
            NativeEvent::GuildMemberUpdate,
        );
    }

    async fn guild_ban_addition(&self, ctx: Context, guild_id: GuildId, banned_user: User) {
        self.emit(
            &ctx,
            || GatewayEvent::GuildBanAdd {
                guild_id,
                user: banned_user,
            },
            NativeEvent::GuildBanAdd,
        );
    }

    async fn guild_ban_removal(&self, ctx: Context, guild_id: GuildId, unbanned_user: User) {
        self.emit(
            &ctx,
            || GatewayEvent::GuildBanRemove {
                guild_id,
                user: unbanned_user,
            },
            NativeEvent::GuildBanRemove,
        );
    }

    async fn guild_role_create(&self, ctx: Context, new: Role) {
        self.emit(&ctx, || GatewayEvent::RoleCreate(new), NativeEvent::RoleCreate);
    }

    async fn guild_role_update(
        &self,
        ctx: Context,
        old_data_if_available: Option<Role>,
        new: Role,
    ) {
        self.emit(
            &ctx,
            || GatewayEvent::RoleUpdate {
                old: old_data_if_available,
                new,
            },
            NativeEvent::RoleUpdate,
        );
    }

    async fn guild_role_delete(
        &self,
        ctx: Context,
        guild_id: GuildId,
        removed_role_id: RoleId,
        removed_role_data_if_available: Option<Role>,
    ) {
        self.emit(
            &ctx,
            || GatewayEvent::RoleDelete {
                guild_id,
                role_id: removed_role_id,
                role: removed_role_data_if_available,
            },
            NativeEvent::RoleDelete,
        );
    }

    async fn channel_create(&self, ctx: Context, channel: GuildChannel) {
        self.emit(
            &ctx,
            || GatewayEvent::ChannelCreate(channel),
            NativeEvent::ChannelCreate,
        );
    }

    async fn channel_update(&self, ctx: Context, old: Option<GuildChannel>, new: GuildChannel) {
        self.emit(
            &ctx,
            || GatewayEvent::ChannelUpdate { old, new },
            NativeEvent::ChannelUpdate,
        );
    }

    async fn channel_delete(
        &self,
        ctx: Context,
        channel: GuildChannel,
        messages: Option<Vec<Message>>,
    ) {
        self.emit(
            &ctx,
            || GatewayEvent::ChannelDelete { channel, messages },
            NativeEvent::ChannelDelete,
        );
    }

    async fn thread_create(&self, ctx: Context, thread: GuildChannel) {
        self.emit(
            &ctx,
            || GatewayEvent::ThreadCreate(thread),
            NativeEvent::ThreadCreate,
        );
    }

    async fn thread_update(&self, ctx: Context, old: Option<GuildChannel>, new: GuildChannel) {
        self.emit(
            &ctx,
            || GatewayEvent::ThreadUpdate { old, new },
            NativeEvent::ThreadUpdate,
        );
    }

    async fn thread_delete(
        &self,
        ctx: Context,
        thread: PartialGuildChannel,
        full_thread_data: Option<GuildChannel>,
    ) {
        self.emit(
            &ctx,
            || GatewayEvent::ThreadDelete {
                thread,
                full: full_thread_data,
            },
            NativeEvent::ThreadDelete,
        );
    }

    async fn invite_create(&self, ctx: Context, data: InviteCreateEvent) {
        self.emit(&ctx, || GatewayEvent::InviteCreate(data), NativeEvent::InviteCreate);
    }

    async fn invite_delete(&self, ctx: Context, data: InviteDeleteEvent) {
        self.emit(&ctx, || GatewayEvent::InviteDelete(data), NativeEvent::InviteDelete);
    }

    async fn webhook_update(
        &self,
        ctx: Context,
        guild_id: GuildId,
        belongs_to_channel_id: ChannelId,
    ) {
        self.emit(
            &ctx,
            || GatewayEvent::WebhooksUpdate {
                guild_id,
                channel_id: belongs_to_channel_id,
            },
            NativeEvent::WebhooksUpdate,
        );
    }

    async fn presence_update(&self, ctx: Context, new_data: Presence) {
        self.emit(
            &ctx,
            || GatewayEvent::PresenceUpdate(new_data),
            NativeEvent::PresenceUpdate,
        );
    }

    async fn typing_start(&self, ctx: Context, event: TypingStartEvent) {
        self.emit(
            &ctx,
            || GatewayEvent::TypingStart(event),
            NativeEvent::TypingStart,
        );
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        self.emit(
            &ctx,
            || GatewayEvent::VoiceStateUpdate { old, new },
            NativeEvent::VoiceStateUpdate,
        );
    }
}
