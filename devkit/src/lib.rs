/*!
# Pi Panel DevKit - Fixtures pour les tests

Bibliothèque facilitant l'écriture de tests du panel avec:
- Arborescences temporaires servant de racine confinée
- Lecteurs asynchrones synthétiques (flux volumineux, coupures client)
- Mesure de la taille des tampons demandés par un consommateur
*/

pub mod readers;
pub mod test_utils;

pub use readers::{pattern_byte, FailingReader, PatternReader};
pub use test_utils::TestTree;
