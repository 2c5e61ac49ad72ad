use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use mlua::{LuaSerdeExt as _, prelude::*};
use serenity::all::{
    ChannelId, Guild, GuildChannel, GuildId, GuildMemberUpdateEvent, Interaction,
    InviteCreateEvent, InviteDeleteEvent, Member, Message, MessageId, MessageUpdateEvent,
    PartialGuild, PartialGuildChannel, Presence, Reaction, Ready, Role, RoleId, TypingStartEvent,
    UnavailableGuild, User, VoiceState,
};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    error::{Error, Result},
    lua::ScriptHost,
    registry::{Handler, HandlerFuture},
};

/// Listeners per event before a leak warning is logged.
pub const DEFAULT_MAX_LISTENERS: usize = 10;

/// Gateway events that can be listened to by name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "camelCase")]
pub enum NativeEvent {
    Ready,
    MessageCreate,
    MessageUpdate,
    MessageDelete,
    MessageDeleteBulk,
    MessageReactionAdd,
    MessageReactionRemove,
    MessageReactionRemoveAll,
    MessageReactionRemoveEmoji,
    InteractionCreate,
    GuildCreate,
    GuildUpdate,
    GuildDelete,
    GuildMemberAdd,
    GuildMemberUpdate,
    GuildMemberRemove,
    GuildBanAdd,
    GuildBanRemove,
    RoleCreate,
    RoleUpdate,
    RoleDelete,
    ChannelCreate,
    ChannelUpdate,
    ChannelDelete,
    ThreadCreate,
    ThreadUpdate,
    ThreadDelete,
    InviteCreate,
    InviteDelete,
    WebhooksUpdate,
    PresenceUpdate,
    TypingStart,
    VoiceStateUpdate,
}

/// Payload of a gateway event as handed to event callbacks.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Ready(Ready),
    MessageCreate(Message),
    MessageUpdate {
        old: Option<Message>,
        new: Option<Message>,
        event: MessageUpdateEvent,
    },
    MessageDelete {
        channel_id: ChannelId,
        message_id: MessageId,
        guild_id: Option<GuildId>,
    },
    MessageDeleteBulk {
        channel_id: ChannelId,
        message_ids: Vec<MessageId>,
        guild_id: Option<GuildId>,
    },
    MessageReactionAdd(Reaction),
    MessageReactionRemove(Reaction),
    MessageReactionRemoveAll {
        channel_id: ChannelId,
        message_id: MessageId,
    },
    MessageReactionRemoveEmoji(Reaction),
    InteractionCreate(Interaction),
    GuildCreate {
        guild: Guild,
        is_new: Option<bool>,
    },
    GuildUpdate {
        old: Option<Guild>,
        new: PartialGuild,
    },
    GuildDelete {
        incomplete: UnavailableGuild,
        full: Option<Guild>,
    },
    GuildMemberAdd(Member),
    GuildMemberUpdate {
        old: Option<Member>,
        new: Option<Member>,
        event: GuildMemberUpdateEvent,
    },
    GuildMemberRemove {
        guild_id: GuildId,
        user: User,
        member: Option<Member>,
    },
    GuildBanAdd {
        guild_id: GuildId,
        user: User,
    },
    GuildBanRemove {
        guild_id: GuildId,
        user: User,
    },
    RoleCreate(Role),
    RoleUpdate {
        old: Option<Role>,
        new: Role,
    },
    RoleDelete {
        guild_id: GuildId,
        role_id: RoleId,
        role: Option<Role>,
    },
    ChannelCreate(GuildChannel),
    ChannelUpdate {
        old: Option<GuildChannel>,
        new: GuildChannel,
    },
    ChannelDelete {
        channel: GuildChannel,
        messages: Option<Vec<Message>>,
    },
    ThreadCreate(GuildChannel),
    ThreadUpdate {
        old: Option<GuildChannel>,
        new: GuildChannel,
    },
    ThreadDelete {
        thread: PartialGuildChannel,
        full: Option<GuildChannel>,
    },
    InviteCreate(InviteCreateEvent),
    InviteDelete(InviteDeleteEvent),
    WebhooksUpdate {
        guild_id: GuildId,
        channel_id: ChannelId,
    },
    PresenceUpdate(Presence),
    TypingStart(TypingStartEvent),
    VoiceStateUpdate {
        old: Option<VoiceState>,
        new: VoiceState,
    },
}

impl GatewayEvent {
    pub fn kind(&self) -> NativeEvent {
        match self {
            GatewayEvent::Ready(_) => NativeEvent::Ready,
            GatewayEvent::MessageCreate(_) => NativeEvent::MessageCreate,
            GatewayEvent::MessageUpdate { .. } => NativeEvent::MessageUpdate,
            GatewayEvent::MessageDelete { .. } => NativeEvent::MessageDelete,
            GatewayEvent::MessageDeleteBulk { .. } => NativeEvent::MessageDeleteBulk,
            GatewayEvent::MessageReactionAdd(_) => NativeEvent::MessageReactionAdd,
            GatewayEvent::MessageReactionRemove(_) => NativeEvent::MessageReactionRemove,
            GatewayEvent::MessageReactionRemoveAll { .. } => NativeEvent::MessageReactionRemoveAll,
            GatewayEvent::MessageReactionRemoveEmoji(_) => NativeEvent::MessageReactionRemoveEmoji,
            GatewayEvent::InteractionCreate(_) => NativeEvent::InteractionCreate,
            GatewayEvent::GuildCreate { .. } => NativeEvent::GuildCreate,
            GatewayEvent::GuildUpdate { .. } => NativeEvent::GuildUpdate,
            GatewayEvent::GuildDelete { .. } => NativeEvent::GuildDelete,
            GatewayEvent::GuildMemberAdd(_) => NativeEvent::GuildMemberAdd,
            GatewayEvent::GuildMemberUpdate { .. } => NativeEvent::GuildMemberUpdate,
            GatewayEvent::GuildMemberRemove { .. } => NativeEvent::GuildMemberRemove,
            GatewayEvent::GuildBanAdd { .. } => NativeEvent::GuildBanAdd,
            GatewayEvent::GuildBanRemove { .. } => NativeEvent::GuildBanRemove,
            GatewayEvent::RoleCreate(_) => NativeEvent::RoleCreate,
            GatewayEvent::RoleUpdate { .. } => NativeEvent::RoleUpdate,
            GatewayEvent::RoleDelete { .. } => NativeEvent::RoleDelete,
            GatewayEvent::ChannelCreate(_) => NativeEvent::ChannelCreate,
            GatewayEvent::ChannelUpdate { .. } => NativeEvent::ChannelUpdate,
            GatewayEvent::ChannelDelete { .. } => NativeEvent::ChannelDelete,
            GatewayEvent::ThreadCreate(_) => NativeEvent::ThreadCreate,
            GatewayEvent::ThreadUpdate { .. } => NativeEvent::ThreadUpdate,
            GatewayEvent::ThreadDelete { .. } => NativeEvent::ThreadDelete,
            GatewayEvent::InviteCreate(_) => NativeEvent::InviteCreate,
            GatewayEvent::InviteDelete(_) => NativeEvent::InviteDelete,
            GatewayEvent::WebhooksUpdate { .. } => NativeEvent::WebhooksUpdate,
            GatewayEvent::PresenceUpdate(_) => NativeEvent::PresenceUpdate,
            GatewayEvent::TypingStart(_) => NativeEvent::TypingStart,
            GatewayEvent::VoiceStateUpdate { .. } => NativeEvent::VoiceStateUpdate,
        }
    }

    /// The event's arguments, in gateway order, as Lua values. Absent
    /// optional values become `nil`.
    pub fn args(&self, lua: &Lua) -> LuaResult<LuaMultiValue> {
        let values = match self {
            GatewayEvent::Ready(ready) => vec![to_lua(lua, ready)?],
            GatewayEvent::MessageCreate(message) => vec![to_lua(lua, message)?],
            GatewayEvent::MessageUpdate { old, new, event } => {
                vec![to_lua(lua, old)?, to_lua(lua, new)?, to_lua(lua, event)?]
            }
            GatewayEvent::MessageDelete {
                channel_id,
                message_id,
                guild_id,
            } => vec![to_lua(lua, channel_id)?, to_lua(lua, message_id)?, to_lua(lua, guild_id)?],
            GatewayEvent::MessageDeleteBulk {
                channel_id,
                message_ids,
                guild_id,
            } => vec![to_lua(lua, channel_id)?, to_lua(lua, message_ids)?, to_lua(lua, guild_id)?],
            GatewayEvent::MessageReactionAdd(reaction)
            | GatewayEvent::MessageReactionRemove(reaction)
            | GatewayEvent::MessageReactionRemoveEmoji(reaction) => vec![to_lua(lua, reaction)?],
            GatewayEvent::MessageReactionRemoveAll {
                channel_id,
                message_id,
            } => vec![to_lua(lua, channel_id)?, to_lua(lua, message_id)?],
            GatewayEvent::InteractionCreate(interaction) => vec![to_lua(lua, interaction)?],
            GatewayEvent::GuildCreate { guild, is_new } => vec![to_lua(lua, guild)?, to_lua(lua, is_new)?],
            GatewayEvent::GuildUpdate { old, new } => vec![to_lua(lua, old)?, to_lua(lua, new)?],
            GatewayEvent::GuildDelete { incomplete, full } => {
                vec![to_lua(lua, incomplete)?, to_lua(lua, full)?]
            }
            GatewayEvent::GuildMemberAdd(member) => vec![to_lua(lua, member)?],
            GatewayEvent::GuildMemberUpdate { old, new, event } => {
                vec![to_lua(lua, old)?, to_lua(lua, new)?, to_lua(lua, event)?]
            }
            GatewayEvent::GuildMemberRemove {
                guild_id,
                user,
                member,
            } => vec![to_lua(lua, guild_id)?, to_lua(lua, user)?, to_lua(lua, member)?],
            GatewayEvent::GuildBanAdd { guild_id, user }
            | GatewayEvent::GuildBanRemove { guild_id, user } => {
                vec![to_lua(lua, guild_id)?, to_lua(lua, user)?]
            }
            GatewayEvent::RoleCreate(role) => vec![to_lua(lua, role)?],
            GatewayEvent::RoleUpdate { old, new } => vec![to_lua(lua, old)?, to_lua(lua, new)?],
            GatewayEvent::RoleDelete {
                guild_id,
                role_id,
                role,
            } => vec![to_lua(lua, guild_id)?, to_lua(lua, role_id)?, to_lua(lua, role)?],
            GatewayEvent::ChannelCreate(channel) | GatewayEvent::ThreadCreate(channel) => {
                vec![to_lua(lua, channel)?]
            }
            GatewayEvent::ChannelUpdate { old, new } | GatewayEvent::ThreadUpdate { old, new } => {
                vec![to_lua(lua, old)?, to_lua(lua, new)?]
            }
            GatewayEvent::ChannelDelete { channel, messages } => {
                vec![to_lua(lua, channel)?, to_lua(lua, messages)?]
            }
            GatewayEvent::ThreadDelete { thread, full } => vec![to_lua(lua, thread)?, to_lua(lua, full)?],
            GatewayEvent::InviteCreate(invite) => vec![to_lua(lua, invite)?],
            GatewayEvent::InviteDelete(invite) => vec![to_lua(lua, invite)?],
            GatewayEvent::WebhooksUpdate {
                guild_id,
                channel_id,
            } => vec![to_lua(lua, guild_id)?, to_lua(lua, channel_id)?],
            GatewayEvent::PresenceUpdate(presence) => vec![to_lua(lua, presence)?],
            GatewayEvent::TypingStart(event) => vec![to_lua(lua, event)?],
            GatewayEvent::VoiceStateUpdate { old, new } => vec![to_lua(lua, old)?, to_lua(lua, new)?],
        };
        Ok(LuaMultiValue::from_vec(values))
    }
}

/// What a callback was attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSource {
    Native(NativeEvent),
    Custom { name: String, trigger: NativeEvent },
}

/// Arguments handed to an event callback.
pub struct EventArgs<C> {
    pub ctx: C,
    pub event: Arc<GatewayEvent>,
}

pub type EventCallback<C> = Handler<EventArgs<C>>;

/// A custom event loaded from the events directory: fires on `trigger` when
/// `condition` holds.
#[derive(Clone)]
struct Descriptor {
    trigger: NativeEvent,
    condition: LuaFunction,
}

struct Binding<C> {
    guard: Option<(String, LuaFunction)>,
    callback: EventCallback<C>,
}

/// Resolves event names and holds every attached callback, grouped by the
/// native event that triggers it.
pub struct EventBinder<C> {
    host: ScriptHost,
    events_dir: PathBuf,
    descriptors: HashMap<String, Descriptor>,
    bindings: HashMap<NativeEvent, Vec<Binding<C>>>,
    max_listeners: usize,
}

impl<C: Clone + Send + 'static> EventBinder<C> {
    pub fn new(host: ScriptHost, events_dir: impl Into<PathBuf>) -> Self {
        Self {
            host,
            events_dir: events_dir.into(),
            descriptors: HashMap::new(),
            bindings: HashMap::new(),
            max_listeners: DEFAULT_MAX_LISTENERS,
        }
    }

    pub fn events_dir(&self) -> &Path {
        &self.events_dir
    }

    /// Listener count per event above which a warning is logged. `0` turns
    /// the warning off.
    pub fn set_max_listeners(&mut self, max: usize) {
        self.max_listeners = max;
    }

    pub fn max_listeners(&self) -> usize {
        self.max_listeners
    }

    /// Attaches `callback` to the event called `name`. A descriptor script in
    /// the events directory takes precedence over a native event of the same
    /// name.
    pub fn bind(&mut self, name: &str, callback: EventCallback<C>) -> Result<EventSource> {
        if let Some(descriptor) = self.descriptor(name)? {
            self.attach(
                descriptor.trigger,
                Binding {
                    guard: Some((name.to_string(), descriptor.condition)),
                    callback,
                },
            );
            return Ok(EventSource::Custom {
                name: name.to_string(),
                trigger: descriptor.trigger,
            });
        }

        if let Ok(native) = name.parse::<NativeEvent>() {
            self.attach(
                native,
                Binding {
                    guard: None,
                    callback,
                },
            );
            return Ok(EventSource::Native(native));
        }

        Err(Error::EventNotFound(name.to_string()))
    }

    pub fn has_listeners(&self, event: NativeEvent) -> bool {
        self.listener_count(event) > 0
    }

    pub fn listener_count(&self, event: NativeEvent) -> usize {
        self.bindings.get(&event).map_or(0, Vec::len)
    }

    /// Returns one future per callback whose guard accepts `event`. A guard
    /// that errors is treated as rejecting the event.
    pub fn dispatch(&self, ctx: C, event: Arc<GatewayEvent>) -> Vec<HandlerFuture> {
        let Some(bindings) = self.bindings.get(&event.kind()) else {
            return vec![];
        };

        let guarded = bindings.iter().any(|binding| binding.guard.is_some());
        let args = if guarded {
            event
                .args(self.host.lua())
                .inspect_err(|err| {
                    tracing::warn!(event = %event.kind(), "failed to convert event arguments: {err}")
                })
                .ok()
        } else {
            None
        };

        bindings
            .iter()
            .filter(|binding| {
                let Some((name, condition)) = &binding.guard else {
                    return true;
                };
                let Some(args) = &args else {
                    return false;
                };
                condition
                    .call::<bool>(args.clone())
                    .unwrap_or_else(|err| {
                        tracing::warn!(event = name.as_str(), "event condition failed: {err}");
                        false
                    })
            })
            .map(|binding| {
                (binding.callback)(EventArgs {
                    ctx: ctx.clone(),
                    event: event.clone(),
                })
            })
            .collect()
    }

    fn attach(&mut self, event: NativeEvent, binding: Binding<C>) {
        let listeners = self.bindings.entry(event).or_default();
        listeners.push(binding);
        if self.max_listeners > 0 && listeners.len() > self.max_listeners {
            tracing::warn!(
                "possible listener leak: {} listeners attached to {event}, limit is {}",
                listeners.len(),
                self.max_listeners
            );
        }
    }

    /// Loads and caches the descriptor for `name`, if the events directory
    /// has one.
    fn descriptor(&mut self, name: &str) -> Result<Option<Descriptor>> {
        if let Some(descriptor) = self.descriptors.get(name) {
            return Ok(Some(descriptor.clone()));
        }
        if name.is_empty() || name.contains(['/', '\\', '.']) {
            return Ok(None);
        }
        let Some(path) = ScriptHost::find_script(&self.events_dir, name) else {
            return Ok(None);
        };

        let descriptor = self.load_descriptor(&path)?;
        tracing::debug!(
            event = name,
            trigger = %descriptor.trigger,
            "loaded event descriptor"
        );
        self.descriptors.insert(name.to_string(), descriptor.clone());
        Ok(Some(descriptor))
    }

    fn load_descriptor(&self, path: &Path) -> Result<Descriptor> {
        let invalid = |message: String| Error::InvalidDescriptor {
            path: path.to_path_buf(),
            message,
        };

        let value = self
            .host
            .eval_file(path)
            .map_err(|err| invalid(err.to_string()))?;
        let LuaValue::Table(module) = value else {
            return Err(invalid(format!(
                "expected a table, got {}",
                value.type_name()
            )));
        };

        let trigger: String = module
            .get("trigger")
            .map_err(|err| invalid(format!("`trigger` must be a string: {err}")))?;
        let trigger = trigger
            .parse::<NativeEvent>()
            .map_err(|_| invalid(format!("unknown trigger {trigger:?}")))?;
        let condition: LuaFunction = module
            .get("condition")
            .map_err(|err| invalid(format!("`condition` must be a function: {err}")))?;

        Ok(Descriptor { trigger, condition })
    }
}

/// Parses a listener limit from text, such as an environment variable.
pub fn parse_listener_limit(value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidListenerLimit(value.to_string()))
}

fn to_lua<T: serde::Serialize>(lua: &Lua, value: &T) -> LuaResult<LuaValue> {
    lua.to_value_with(
        value,
        mlua::SerializeOptions::new()
            .serialize_none_to_null(false)
            .serialize_unit_to_null(false),
    )
}
