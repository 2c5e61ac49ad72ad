use std::sync::Arc;

use mlua::prelude::*;
use serenity::all::{
    ChannelId, ComponentInteraction, ComponentInteractionDataKind, CreateInteractionResponse,
    CreateInteractionResponseMessage, CreateMessage, Http, MessageId, User,
};

use crate::dispatch::{CommandEvent, ComponentEvent};

/// Converts a dispatched event into the table a script handler receives.
pub trait ScriptArg: Send + 'static {
    fn into_lua_table(self, lua: &Lua) -> LuaResult<LuaTable>;
}

impl ScriptArg for CommandEvent {
    fn into_lua_table(self, lua: &Lua) -> LuaResult<LuaTable> {
        let message = &self.message;
        let table = lua.create_table()?;
        table.set("id", message.id.get().to_string())?;
        table.set("content", message.content.clone())?;
        table.set("args", lua.create_sequence_from(self.args.iter().cloned())?)?;
        table.set("channel_id", message.channel_id.get().to_string())?;
        if let Some(guild_id) = message.guild_id {
            table.set("guild_id", guild_id.get().to_string())?;
        }
        table.set("author", user_table(lua, &message.author)?)?;

        let http = self.ctx.http.clone();
        let channel_id = message.channel_id;
        table.set("send", send_function(lua, http.clone(), channel_id, None)?)?;
        table.set(
            "reply",
            send_function(lua, http, channel_id, Some(message.id))?,
        )?;

        Ok(table)
    }
}

impl ScriptArg for ComponentEvent {
    fn into_lua_table(self, lua: &Lua) -> LuaResult<LuaTable> {
        let interaction = &self.interaction;
        let table = lua.create_table()?;
        table.set("id", interaction.id.get().to_string())?;
        table.set("custom_id", interaction.data.custom_id.clone())?;
        let (kind, values) = component_values(&interaction.data.kind);
        table.set("kind", kind)?;
        table.set("values", lua.create_sequence_from(values)?)?;
        table.set("channel_id", interaction.channel_id.get().to_string())?;
        if let Some(guild_id) = interaction.guild_id {
            table.set("guild_id", guild_id.get().to_string())?;
        }
        table.set("user", user_table(lua, &interaction.user)?)?;

        let http = self.ctx.http.clone();
        table.set(
            "reply",
            respond_function(lua, http.clone(), interaction.clone(), |text| {
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new().content(text),
                )
            })?,
        )?;
        table.set(
            "update",
            respond_function(lua, http, interaction.clone(), |text| {
                CreateInteractionResponse::UpdateMessage(
                    CreateInteractionResponseMessage::new().content(text),
                )
            })?,
        )?;

        Ok(table)
    }
}

fn user_table(lua: &Lua, user: &User) -> LuaResult<LuaTable> {
    let table = lua.create_table()?;
    table.set("id", user.id.get().to_string())?;
    table.set("name", user.name.clone())?;
    table.set("bot", user.bot)?;
    Ok(table)
}

pub(crate) fn component_values(kind: &ComponentInteractionDataKind) -> (&'static str, Vec<String>) {
    use ComponentInteractionDataKind as K;
    match kind {
        K::Button => ("button", vec![]),
        K::StringSelect { values } => ("string_select", values.clone()),
        K::UserSelect { values } => (
            "user_select",
            values.iter().map(|id| id.get().to_string()).collect(),
        ),
        K::RoleSelect { values } => (
            "role_select",
            values.iter().map(|id| id.get().to_string()).collect(),
        ),
        K::MentionableSelect { values } => (
            "mentionable_select",
            values.iter().map(|id| id.get().to_string()).collect(),
        ),
        K::ChannelSelect { values } => (
            "channel_select",
            values.iter().map(|id| id.get().to_string()).collect(),
        ),
        _ => ("unknown", vec![]),
    }
}

/// `send(text)` posts to the channel; with `reply_to` set the message
/// references the original.
fn send_function(
    lua: &Lua,
    http: Arc<Http>,
    channel_id: ChannelId,
    reply_to: Option<MessageId>,
) -> LuaResult<LuaFunction> {
    lua.create_async_function(move |_lua, text: String| {
        let http = http.clone();
        async move {
            let mut builder = CreateMessage::new().content(text);
            if let Some(message_id) = reply_to {
                builder = builder.reference_message((channel_id, message_id));
            }
            channel_id
                .send_message(&http, builder)
                .await
                .map_err(LuaError::external)?;
            Ok::<_, LuaError>(())
        }
    })
}

fn respond_function(
    lua: &Lua,
    http: Arc<Http>,
    interaction: ComponentInteraction,
    build: fn(String) -> CreateInteractionResponse,
) -> LuaResult<LuaFunction> {
    lua.create_async_function(move |_lua, text: String| {
        let http = http.clone();
        let interaction = interaction.clone();
        async move {
            interaction
                .create_response(&http, build(text))
                .await
                .map_err(LuaError::external)?;
            Ok::<_, LuaError>(())
        }
    })
}
