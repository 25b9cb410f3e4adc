use std::error::Error;
use std::fs;

use test_utils::emit_lua;

#[test]
fn strips_annotations_from_a_module() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::Builder::new()
        .prefix("titanc_it")
        .tempdir()?;
    let path = dir.path().join("m.pln");
    fs::write(
        &path,
        "local function add(x: integer, y: integer): integer\n    return x + y\nend\n",
    )?;

    let lua = emit_lua(&path)?;
    assert_eq!(lua, "local function add(x, y)\n    return x + y\nend\n");
    Ok(())
}

#[test]
fn leaves_plain_lua_alone() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::Builder::new()
        .prefix("titanc_it")
        .tempdir()?;
    let path = dir.path().join("plain.pln");
    let source = "local x = 1\nlocal function f()\n    x = 2\nend\n";
    fs::write(&path, source)?;

    let lua = emit_lua(&path)?;
    assert_eq!(lua, source);
    Ok(())
}
