//! Tests for loading whole module sets

use ks_core::{GameMode, LauncherError, LoaderError};
use ks_loader::module::REQUIRED_MODULES;
use ks_loader::{
    module_set, ExportTable, ModuleLoader, ModuleStatus, NativeBackend, Selector, TableBackend,
};
use std::path::PathBuf;

extern "system" fn ready() -> i32 {
    1
}

fn full_backend(extra: &[&str]) -> TableBackend {
    let backend = TableBackend::new();
    for spec in REQUIRED_MODULES.iter() {
        backend.register(ExportTable::new(spec.name));
    }
    for name in extra {
        backend.register(
            ExportTable::new(name).name("GetDefaultScreenMode", ready as extern "system" fn() -> i32),
        );
    }
    backend
}

fn table_loader(backend: &TableBackend) -> ModuleLoader {
    ModuleLoader::with_search_dirs(backend.clone(), vec![PathBuf::from("/install")])
}

#[test]
fn test_single_player_without_server_module() {
    let backend = full_backend(&[]);
    let mut loader = table_loader(&backend);

    loader.load_set(&module_set(GameMode::SinglePlayer)).unwrap();

    let server = loader.find("D2Server").unwrap();
    assert_eq!(loader.descriptor(server).unwrap().status(), ModuleStatus::LoadFailed);
    assert!(loader
        .descriptors()
        .filter(|d| d.is_required())
        .all(|d| d.status() == ModuleStatus::Loaded));
}

#[test]
fn test_battle_net_loads_client_and_multi() {
    let backend = full_backend(&["D2Client", "D2Multi"]);
    let mut loader = table_loader(&backend);

    loader.load_set(&module_set(GameMode::BattleNet)).unwrap();
    assert!(loader.is_loaded("D2Client"));
    assert!(loader.is_loaded("D2Multi"));
    assert!(loader.find("D2Server").is_none());

    let binding = unsafe {
        loader.bind::<extern "system" fn() -> i32>("D2Client", Selector::Name("GetDefaultScreenMode"))
    };
    assert_eq!(binding.call_or(0, |f| f()), 1);
}

#[test]
fn test_optional_module_binding_is_unresolved() {
    let backend = full_backend(&[]);
    let mut loader = table_loader(&backend);
    loader.load_set(&module_set(GameMode::Multiplayer)).unwrap();

    let binding = unsafe {
        loader.bind::<extern "system" fn() -> i32>("D2Client", Selector::Name("GetDefaultScreenMode"))
    };
    assert!(!binding.is_resolved());
    assert_eq!(binding.call_or(-1, |f| f()), -1);
}

#[test]
fn test_every_module_released_once() {
    let backend = full_backend(&["D2Server"]);
    {
        let mut loader = table_loader(&backend);
        loader.load_set(&module_set(GameMode::SinglePlayer)).unwrap();
        loader.unload_all();
    }

    let log = backend.close_log();
    assert_eq!(log.len(), 10);
    assert_eq!(log.first().map(String::as_str), Some("D2Server"));
    assert_eq!(log.last().map(String::as_str), Some("Fog"));
}

#[test]
fn test_native_backend_reports_search_path() {
    let install = tempfile::tempdir().unwrap();
    let cwd = tempfile::tempdir().unwrap();
    let mut loader = ModuleLoader::with_search_dirs(
        NativeBackend::new(),
        vec![install.path().to_path_buf(), cwd.path().to_path_buf()],
    );

    let err = loader.load(REQUIRED_MODULES[0]).unwrap_err();
    assert_eq!(err.exit_code(), 0x20);
    match err {
        LauncherError::RequiredModule {
            source: LoaderError::NotFound { searched, .. },
            ..
        } => {
            assert_eq!(searched.len(), 2);
            assert!(searched[0].starts_with(install.path()));
            assert!(searched[1].starts_with(cwd.path()));
        }
        other => panic!("unexpected error {:?}", other),
    }
}
