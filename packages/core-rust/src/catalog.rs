//! Static catalog of the relational tables exposed by the API.
//!
//! Every table is described once: its display name, the key under which the
//! client store holds its collection, and the identifier field that makes a
//! row unique. Callers name tables in three different ways (the collection
//! key, the identifier field, or a legacy singular alias), so
//! [`TableKind::resolve`] accepts all three.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the logical tables known to the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Participants,
    Families,
    GeneticFindings,
    Analytes,
    BiobankEntries,
    Phenotypes,
    Experiments,
    ExperimentStages,
    ExperimentDnaShortRead,
    ExperimentRnaShortRead,
    ExperimentPacBio,
    ExperimentNanopore,
    Aligned,
    AlignedDnaShortRead,
    AlignedNanopore,
    AlignedPacBio,
    AlignedRnaShortRead,
}

/// Descriptor for one catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableInfo {
    pub kind: TableKind,
    /// Human-readable name shown in table pickers.
    pub display_name: &'static str,
    /// Key of the collection in the client store and in the fetch-all payload.
    pub collection_key: &'static str,
    /// Field that uniquely identifies a row of this table.
    pub identifier_field: &'static str,
    /// Extra names accepted by [`TableKind::resolve`].
    pub aliases: &'static [&'static str],
}

static CATALOG: [TableInfo; 17] = [
    TableInfo {
        kind: TableKind::Participants,
        display_name: "Participants",
        collection_key: "participants",
        identifier_field: "participant_id",
        aliases: &["participant"],
    },
    TableInfo {
        kind: TableKind::Families,
        display_name: "Families",
        collection_key: "families",
        identifier_field: "family_id",
        aliases: &["family"],
    },
    TableInfo {
        kind: TableKind::GeneticFindings,
        display_name: "Genetic Findings",
        collection_key: "genetic_findings",
        identifier_field: "genetic_findings_id",
        aliases: &[],
    },
    TableInfo {
        kind: TableKind::Analytes,
        display_name: "Analytes",
        collection_key: "analytes",
        identifier_field: "analyte_id",
        aliases: &["analyte"],
    },
    TableInfo {
        kind: TableKind::BiobankEntries,
        display_name: "Biobank Entries",
        collection_key: "biobank_entries",
        identifier_field: "biobank_id",
        aliases: &["biobank"],
    },
    TableInfo {
        kind: TableKind::Phenotypes,
        display_name: "Phenotypes",
        collection_key: "phenotypes",
        identifier_field: "phenotype_id",
        aliases: &["phenotype"],
    },
    TableInfo {
        kind: TableKind::Experiments,
        display_name: "Experiments",
        collection_key: "experiments",
        identifier_field: "experiment_id",
        aliases: &["experiment"],
    },
    TableInfo {
        kind: TableKind::ExperimentStages,
        display_name: "Experiment Stages",
        collection_key: "experiment_stages",
        identifier_field: "experiment_stage_id",
        aliases: &["experiment_stage"],
    },
    TableInfo {
        kind: TableKind::ExperimentDnaShortRead,
        display_name: "DNA Short Read",
        collection_key: "experiment_dna_short_read",
        identifier_field: "experiment_dna_short_read_id",
        aliases: &[],
    },
    TableInfo {
        kind: TableKind::ExperimentRnaShortRead,
        display_name: "RNA Short Read",
        collection_key: "experiment_rna_short_read",
        identifier_field: "experiment_rna_short_read_id",
        aliases: &[],
    },
    TableInfo {
        kind: TableKind::ExperimentPacBio,
        display_name: "PacBio",
        collection_key: "experiment_pac_bio",
        identifier_field: "experiment_pac_bio_id",
        aliases: &[],
    },
    TableInfo {
        kind: TableKind::ExperimentNanopore,
        display_name: "NanoPore",
        collection_key: "experiment_nanopore",
        identifier_field: "experiment_nanopore_id",
        aliases: &[],
    },
    TableInfo {
        kind: TableKind::Aligned,
        display_name: "Aligned Experiments",
        collection_key: "aligned",
        identifier_field: "aligned_id",
        aliases: &[],
    },
    TableInfo {
        kind: TableKind::AlignedDnaShortRead,
        display_name: "Aligned DNA Short Read",
        collection_key: "aligned_dna_short_read",
        identifier_field: "aligned_dna_short_read_id",
        aliases: &[],
    },
    TableInfo {
        kind: TableKind::AlignedNanopore,
        display_name: "Aligned NanoPore",
        collection_key: "aligned_nanopore",
        identifier_field: "aligned_nanopore_id",
        aliases: &[],
    },
    TableInfo {
        kind: TableKind::AlignedPacBio,
        display_name: "Aligned Pac Bio",
        collection_key: "aligned_pac_bio",
        identifier_field: "aligned_pac_bio_id",
        aliases: &[],
    },
    TableInfo {
        kind: TableKind::AlignedRnaShortRead,
        display_name: "Aligned RNA Short Read",
        collection_key: "aligned_rna_short_read",
        identifier_field: "aligned_rna_short_read_id",
        aliases: &[],
    },
];

impl TableKind {
    /// All tables in catalog order (the order of the table picker).
    pub const ALL: [TableKind; 17] = [
        TableKind::Participants,
        TableKind::Families,
        TableKind::GeneticFindings,
        TableKind::Analytes,
        TableKind::BiobankEntries,
        TableKind::Phenotypes,
        TableKind::Experiments,
        TableKind::ExperimentStages,
        TableKind::ExperimentDnaShortRead,
        TableKind::ExperimentRnaShortRead,
        TableKind::ExperimentPacBio,
        TableKind::ExperimentNanopore,
        TableKind::Aligned,
        TableKind::AlignedDnaShortRead,
        TableKind::AlignedNanopore,
        TableKind::AlignedPacBio,
        TableKind::AlignedRnaShortRead,
    ];

    /// Returns the catalog descriptor for this table.
    #[must_use]
    pub fn info(self) -> &'static TableInfo {
        // CATALOG is declared in the same order as the enum variants.
        &CATALOG[self as usize]
    }

    #[must_use]
    pub fn collection_key(self) -> &'static str {
        self.info().collection_key
    }

    #[must_use]
    pub fn identifier_field(self) -> &'static str {
        self.info().identifier_field
    }

    #[must_use]
    pub fn display_name(self) -> &'static str {
        self.info().display_name
    }

    /// Resolves a logical table name.
    ///
    /// Matches, in order, the collection key, the identifier field, and the
    /// legacy aliases. Returns `None` for anything else.
    #[must_use]
    pub fn resolve(name: &str) -> Option<TableKind> {
        CATALOG
            .iter()
            .find(|info| {
                info.collection_key == name
                    || info.identifier_field == name
                    || info.aliases.contains(&name)
            })
            .map(|info| info.kind)
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection_key())
    }
}
