/*!
Arborescence de test pour le panel

Facilite l'écriture de tests sur la racine confinée avec:
- Création d'une racine `root/` dans un répertoire temporaire
- Dossiers « frères » hors racine pour les tests d'évasion
- Fichiers, dossiers, symlinks et dates de modification contrôlées
*/

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::TempDir;

/// Racine confinée temporaire, supprimée à la fin du test
pub struct TestTree {
    _tmp: TempDir,
    root: PathBuf,
}

impl TestTree {
    /// Crée `<tmp>/root`
    pub fn new() -> Self {
        env_logger::try_init().ok(); // Init logging pour tests

        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("root");
        fs::create_dir_all(&root).expect("create root");
        log::debug!("📁 Test tree at {}", root.display());

        Self { _tmp: tmp, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Chemin absolu d'une entrée relative à la racine
    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Crée un fichier (et ses parents) avec le contenu donné
    pub fn file(&self, rel: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, contents).expect("write file");
        path
    }

    pub fn dir(&self, rel: &str) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(&path).expect("create dir");
        path
    }

    /// Dossier à côté de la racine (hors confinement)
    pub fn sibling(&self, name: &str) -> PathBuf {
        let path = self.root.parent().expect("tmp parent").join(name);
        fs::create_dir_all(&path).expect("create sibling");
        path
    }

    /// Fixe la date de modification en secondes depuis l'epoch
    pub fn set_mtime(&self, rel: &str, secs: u64) {
        let time = UNIX_EPOCH + Duration::from_secs(secs);
        let file = fs::File::open(self.path(rel)).expect("open for mtime");
        file.set_modified(time).expect("set mtime");
    }

    #[cfg(unix)]
    pub fn symlink(&self, rel: &str, target: &Path) -> PathBuf {
        let link = self.path(rel);
        std::os::unix::fs::symlink(target, &link).expect("create symlink");
        link
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.path(rel).exists()
    }

    pub fn read(&self, rel: &str) -> Vec<u8> {
        fs::read(self.path(rel)).expect("read file")
    }

    pub fn mtime(&self, rel: &str) -> SystemTime {
        fs::metadata(self.path(rel))
            .and_then(|m| m.modified())
            .expect("mtime")
    }
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new()
    }
}
