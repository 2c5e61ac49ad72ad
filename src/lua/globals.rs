/// Installs the globals every script can rely on.
pub fn register(lua: &mlua::Lua) -> mlua::Result<()> {
    lua.globals().set(
        "sleep",
        lua.create_async_function(|_lua, ms: u32| async move {
            tokio::time::sleep(std::time::Duration::from_millis(ms as u64)).await;
            Ok(())
        })?,
    )?;

    lua.globals().set(
        "yield",
        lua.globals()
            .get("coroutine")
            .and_then(|c: mlua::Table| c.get::<mlua::Function>("yield"))?,
    )?;

    // Scripts have no stdout of their own; print goes to the log.
    lua.globals().set(
        "print",
        lua.create_function(|_lua, values: mlua::Variadic<mlua::Value>| {
            let output = values
                .iter()
                .map(|value| value.to_string())
                .collect::<mlua::Result<Vec<_>>>()?
                .join("\t");
            tracing::info!(target: "herald::script", "{output}");
            Ok(())
        })?,
    )?;

    Ok(())
}
