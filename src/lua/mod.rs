use std::{path::Path, sync::Arc};

use crate::registry::{Handler, HandlerFuture};

mod globals;
mod payload;

pub use payload::ScriptArg;

/// File extensions treated as handler scripts.
pub const SCRIPT_EXTENSIONS: &[&str] = &["lua", "luau"];

/// The Lua state shared by every script the bot loads. Cloning shares the
/// underlying state.
#[derive(Clone)]
pub struct ScriptHost {
    lua: mlua::Lua,
}

impl ScriptHost {
    pub fn new() -> mlua::Result<Self> {
        let lua = mlua::Lua::new_with(
            {
                use mlua::StdLib as SL;
                SL::COROUTINE | SL::MATH | SL::STRING | SL::TABLE | SL::UTF8 | SL::VECTOR
            },
            mlua::LuaOptions::new().catch_rust_panics(true),
        )?;
        globals::register(&lua)?;

        Ok(Self { lua })
    }

    pub fn lua(&self) -> &mlua::Lua {
        &self.lua
    }

    /// Runs the script at `path` and returns whatever it evaluates to.
    ///
    /// Each script gets its own global scope: globals it assigns stay in
    /// that scope, while reads fall back to the shared globals.
    pub fn eval_file(&self, path: &Path) -> mlua::Result<mlua::Value> {
        let code = std::fs::read_to_string(path).map_err(|e| {
            mlua::Error::RuntimeError(format!("Failed to read {}: {e}", path.display()))
        })?;
        self.lua
            .load(&code)
            .set_name(path.display().to_string())
            .set_environment(self.script_environment()?)
            .eval()
    }

    fn script_environment(&self) -> mlua::Result<mlua::Table> {
        let fallback = self.lua.create_table()?;
        fallback.set("__index", self.lua.globals())?;
        let environment = self.lua.create_table()?;
        environment.set_metatable(Some(fallback))?;
        Ok(environment)
    }

    pub fn is_script(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SCRIPT_EXTENSIONS.contains(&ext))
    }

    /// Finds `<dir>/<stem>.lua` (or `.luau`) if it exists.
    pub fn find_script(dir: &Path, stem: &str) -> Option<std::path::PathBuf> {
        SCRIPT_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{stem}.{ext}")))
            .find(|path| path.is_file())
    }
}

/// Adapts a Lua function into a [`Handler`]. Each call converts its argument
/// into a table and runs the function as an async Lua call.
pub fn script_handler<T: ScriptArg>(host: &ScriptHost, function: mlua::Function) -> Handler<T> {
    let lua = host.lua.clone();
    Arc::new(move |arg: T| -> HandlerFuture {
        let lua = lua.clone();
        let function = function.clone();
        Box::pin(async move {
            let table = arg.into_lua_table(&lua)?;
            function.call_async::<()>(table).await?;
            Ok::<_, anyhow::Error>(())
        })
    })
}
