use std::{fs, path::Path};

use herald::{
    Error, ErrorKind, HandlerKind, Registry,
    loader::load_directory,
    lua::{ScriptArg, ScriptHost},
};

/// Stand-in for a platform event; scripts see `{ text = ... }`.
struct Probe(&'static str);
impl ScriptArg for Probe {
    fn into_lua_table(self, lua: &mlua::Lua) -> mlua::Result<mlua::Table> {
        let table = lua.create_table()?;
        table.set("text", self.0)?;
        Ok(table)
    }
}

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn host_with_recorder() -> (ScriptHost, flume::Receiver<String>) {
    let host = ScriptHost::new().unwrap();
    let (tx, rx) = flume::unbounded();
    let record = host
        .lua()
        .create_function(move |_, text: String| {
            tx.send(text).map_err(mlua::Error::external)?;
            Ok(())
        })
        .unwrap();
    host.lua().globals().set("record", record).unwrap();
    (host, rx)
}

fn handler_tree(root: &Path) {
    write(
        root,
        "ping.lua",
        "return { content = function(event) record('pong:' .. event.text) end }",
    );
    write(
        root,
        "admin/Ban.lua",
        "return { name = 'ban', content = function(event) end }",
    );
    write(
        root,
        "buttons/confirm.luau",
        "return { type = 'interaction', content = function(event) record('confirmed') end }",
    );
    write(root, "broken.lua", "return { content = function(event) ");
    write(root, "notable.lua", "return 42");
    write(root, "nocontent.lua", "return { name = 'nothing' }");
    write(root, "README.md", "not a script");
}

#[tokio::test]
async fn loads_valid_scripts_and_reports_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    handler_tree(dir.path());
    let (host, rx) = host_with_recorder();

    let mut commands = Registry::<Probe>::commands();
    let mut interactions = Registry::<Probe>::interactions();
    let report = load_directory(&host, dir.path(), &mut commands, &mut interactions, false).unwrap();

    assert_eq!(report.loaded.len(), 3);
    assert_eq!(report.failed(), 3);
    assert_eq!(report.top_level_entries, 7);

    let mut command_names = report.commands().map(|e| e.name.as_str()).collect::<Vec<_>>();
    command_names.sort();
    assert_eq!(command_names, ["ban", "ping"]);
    assert_eq!(
        report.interactions().map(|e| e.kind).collect::<Vec<_>>(),
        [HandlerKind::Interaction]
    );

    let mut failed = report
        .failures
        .iter()
        .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    failed.sort();
    assert_eq!(failed, ["broken.lua", "nocontent.lua", "notable.lua"]);
    assert!(report.failures.iter().all(|f| !f.message.is_empty()));

    let ping = commands.lookup("PING").unwrap();
    ping(Probe("hi")).await.unwrap();
    assert_eq!(rx.try_recv().unwrap(), "pong:hi");

    let confirm = interactions.lookup("confirm").unwrap();
    confirm(Probe("")).await.unwrap();
    assert_eq!(rx.try_recv().unwrap(), "confirmed");
}

#[test]
fn later_scripts_replace_earlier_names() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.lua", "return { name = 'Echo', content = function() end }");
    write(dir.path(), "b.lua", "return { name = 'echo', content = function() end }");
    let (host, _rx) = host_with_recorder();

    let mut commands = Registry::<Probe>::commands();
    let mut interactions = Registry::<Probe>::interactions();
    let report = load_directory(&host, dir.path(), &mut commands, &mut interactions, true).unwrap();

    assert_eq!(report.loaded.len(), 2);
    assert_eq!(commands.len(), 1);
    assert!(commands.contains("ECHO"));
}

#[test]
fn missing_root_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let (host, _rx) = host_with_recorder();

    let mut commands = Registry::<Probe>::commands();
    let mut interactions = Registry::<Probe>::interactions();
    let err = load_directory(
        &host,
        &dir.path().join("missing"),
        &mut commands,
        &mut interactions,
        false,
    )
    .unwrap_err();

    assert!(matches!(err, Error::LoadRoot { .. }));
    assert_eq!(err.kind(), ErrorKind::Load);
    assert!(commands.is_empty());
}
