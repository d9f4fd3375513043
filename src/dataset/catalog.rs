// Dataset catalog
// Known emotional speech corpora, their filename label conventions and sample discovery

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::DatasetError;
use crate::emotion::Emotion;

/// Emotional speech corpora with a known file naming convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Ravdess,
    Tess,
    Savee,
    Emovo,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 4] = [
        DatasetKind::Ravdess,
        DatasetKind::Tess,
        DatasetKind::Savee,
        DatasetKind::Emovo,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            DatasetKind::Ravdess => "ravdess",
            DatasetKind::Tess => "tess",
            DatasetKind::Savee => "savee",
            DatasetKind::Emovo => "emovo",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DatasetKind::Ravdess => "RAVDESS Dataset Samples",
            DatasetKind::Tess => "TESS Dataset Samples",
            DatasetKind::Savee => "SAVEE Dataset Samples",
            DatasetKind::Emovo => "EMOVO Dataset Samples",
        }
    }

    /// Subdirectory of the datasets root holding this corpus
    pub fn sample_directory(&self) -> &'static str {
        self.id()
    }

    pub fn from_id(id: &str) -> Option<DatasetKind> {
        DatasetKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.id().eq_ignore_ascii_case(id.trim()))
    }

    /// Ground truth encoded in a file name, if it follows this corpus' convention
    ///
    /// - RAVDESS `03-01-05-01-01-01-12.wav`: third field is the emotion code
    /// - TESS `OAF_back_angry.wav`: third field is the emotion word
    /// - SAVEE `DC_sa01.wav`: letters after the underscore
    /// - EMOVO `m1-gio-1.wav`: second field is the Italian emotion code
    pub fn label_from_file_name(&self, file_name: &str) -> Option<Emotion> {
        let stem = file_name.rsplit_once('.').map_or(file_name, |(stem, _)| stem);

        match self {
            DatasetKind::Ravdess => match stem.split('-').nth(2)? {
                "01" => Some(Emotion::Neutral),
                "03" => Some(Emotion::Happy),
                "04" => Some(Emotion::Sad),
                "05" => Some(Emotion::Angry),
                "06" => Some(Emotion::Fear),
                "07" => Some(Emotion::Disgust),
                "08" => Some(Emotion::Surprised),
                // 02 is "calm", which the classifier has no class for
                _ => None,
            },
            DatasetKind::Tess => Emotion::from_alias(stem.split('_').nth(2)?),
            DatasetKind::Savee => {
                let code = stem.split('_').nth(1)?.to_ascii_lowercase();
                let letters: String = code.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
                match letters.as_str() {
                    "a" => Some(Emotion::Angry),
                    "d" => Some(Emotion::Disgust),
                    "f" => Some(Emotion::Fear),
                    "h" => Some(Emotion::Happy),
                    "n" => Some(Emotion::Neutral),
                    "sa" => Some(Emotion::Sad),
                    "su" => Some(Emotion::Surprised),
                    _ => None,
                }
            }
            DatasetKind::Emovo => match stem.split('-').nth(1)?.to_ascii_lowercase().as_str() {
                "neu" => Some(Emotion::Neutral),
                "gio" => Some(Emotion::Happy),
                "tri" => Some(Emotion::Sad),
                "rab" => Some(Emotion::Angry),
                "pau" => Some(Emotion::Fear),
                "dis" => Some(Emotion::Disgust),
                "sor" => Some(Emotion::Surprised),
                _ => None,
            },
        }
    }
}

impl FromStr for DatasetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DatasetKind::from_id(s).ok_or_else(|| format!("unknown dataset: {}", s))
    }
}

/// Label from any emotion word in the path, file name first, then parent directories
pub fn label_from_path(path: &Path) -> Option<Emotion> {
    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string());
    let parents = path
        .parent()
        .into_iter()
        .flat_map(|p| p.components().rev())
        .map(|c| c.as_os_str().to_string_lossy().to_string());

    stem.into_iter().chain(parents).find_map(|part| {
        part.split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|token| token.len() > 2)
            .find_map(Emotion::from_alias)
    })
}

/// A labeled audio file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub path: PathBuf,
    pub emotion: Emotion,

    /// Corpus the file came from; None for generically labeled trees
    pub dataset: Option<DatasetKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub id: String,
    pub name: String,

    /// All `.wav` files found
    pub sample_count: usize,

    /// Files with a recognised ground-truth label
    pub labeled_count: usize,
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("wav"))
        .unwrap_or(false)
}

/// All `.wav` files below `dir`, sorted
fn find_wav_files(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if is_wav(&path) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

/// Labeled samples of one corpus under `root`; a missing corpus directory gives none
pub fn collect_dataset(root: &Path, kind: DatasetKind) -> Result<Vec<Sample>, DatasetError> {
    let dir = root.join(kind.sample_directory());
    if !dir.is_dir() {
        log::debug!("No {} samples at {}", kind.id(), dir.display());
        return Ok(Vec::new());
    }

    let mut samples = Vec::new();
    for path in find_wav_files(&dir)? {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let label = kind
            .label_from_file_name(&file_name)
            .or_else(|| label_from_path(&path));

        match label {
            Some(emotion) => samples.push(Sample {
                path,
                emotion,
                dataset: Some(kind),
            }),
            None => log::debug!("Skipping unlabeled sample {}", path.display()),
        }
    }

    Ok(samples)
}

/// Labeled samples from every known corpus under `root`
///
/// When none of the corpus directories exist, the whole tree is scanned and
/// labeled from emotion words in each path.
pub fn collect_samples(root: &Path) -> Result<Vec<Sample>, DatasetError> {
    if !root.is_dir() {
        return Err(DatasetError::NotFound(root.to_path_buf()));
    }

    let has_known = DatasetKind::ALL
        .iter()
        .any(|kind| root.join(kind.sample_directory()).is_dir());

    let samples = if has_known {
        let mut samples = Vec::new();
        for kind in DatasetKind::ALL {
            samples.extend(collect_dataset(root, kind)?);
        }
        samples
    } else {
        find_wav_files(root)?
            .into_iter()
            .filter_map(|path| {
                label_from_path(&path).map(|emotion| Sample {
                    path,
                    emotion,
                    dataset: None,
                })
            })
            .collect()
    };

    log::info!("Collected {} labeled samples from {}", samples.len(), root.display());
    Ok(samples)
}

/// Up to `limit` labeled samples of one corpus, optionally only those of `emotion`
///
/// When more samples match than `limit`, a random subset drawn from `rng` is kept.
/// The result is in path order either way.
pub fn samples_for<R: Rng + ?Sized>(
    root: &Path,
    kind: DatasetKind,
    emotion: Option<Emotion>,
    limit: usize,
    rng: &mut R,
) -> Result<Vec<Sample>, DatasetError> {
    let matching: Vec<Sample> = collect_dataset(root, kind)?
        .into_iter()
        .filter(|sample| emotion.map_or(true, |e| sample.emotion == e))
        .collect();

    if matching.len() <= limit {
        return Ok(matching);
    }

    let mut chosen: Vec<Sample> = matching.choose_multiple(rng, limit).cloned().collect();
    chosen.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(chosen)
}

/// Labeled samples per emotion across every known corpus under `root`
pub fn count_by_emotion(root: &Path) -> Result<BTreeMap<Emotion, usize>, DatasetError> {
    let mut counts = BTreeMap::new();
    for kind in DatasetKind::ALL {
        for sample in collect_dataset(root, kind)? {
            *counts.entry(sample.emotion).or_insert(0) += 1;
        }
    }
    Ok(counts)
}

/// Summary of each known corpus under `root`
pub fn list_datasets(root: &Path) -> Result<Vec<DatasetInfo>, DatasetError> {
    let mut infos = Vec::new();

    for kind in DatasetKind::ALL {
        let dir = root.join(kind.sample_directory());
        let sample_count = if dir.is_dir() {
            find_wav_files(&dir)?.len()
        } else {
            0
        };

        infos.push(DatasetInfo {
            id: kind.id().to_string(),
            name: kind.display_name().to_string(),
            sample_count,
            labeled_count: collect_dataset(root, kind)?.len(),
        });
    }

    Ok(infos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"RIFF").unwrap();
    }

    #[test]
    fn test_ravdess_labels() {
        let kind = DatasetKind::Ravdess;
        assert_eq!(kind.label_from_file_name("03-01-05-01-01-01-12.wav"), Some(Emotion::Angry));
        assert_eq!(kind.label_from_file_name("03-01-08-02-02-01-01.wav"), Some(Emotion::Surprised));
        assert_eq!(kind.label_from_file_name("03-01-02-01-01-01-01.wav"), None);
        assert_eq!(kind.label_from_file_name("bad.wav"), None);
    }

    #[test]
    fn test_tess_savee_emovo_labels() {
        assert_eq!(
            DatasetKind::Tess.label_from_file_name("OAF_back_ps.wav"),
            Some(Emotion::Surprised)
        );
        assert_eq!(
            DatasetKind::Tess.label_from_file_name("YAF_dog_fear.wav"),
            Some(Emotion::Fear)
        );
        assert_eq!(DatasetKind::Savee.label_from_file_name("DC_sa01.wav"), Some(Emotion::Sad));
        assert_eq!(DatasetKind::Savee.label_from_file_name("JK_su12.wav"), Some(Emotion::Surprised));
        assert_eq!(DatasetKind::Savee.label_from_file_name("KL_a3.wav"), Some(Emotion::Angry));
        assert_eq!(DatasetKind::Emovo.label_from_file_name("m1-gio-b1.wav"), Some(Emotion::Happy));
        assert_eq!(DatasetKind::Emovo.label_from_file_name("f2-xyz-1.wav"), None);
    }

    #[test]
    fn test_label_from_path() {
        assert_eq!(
            label_from_path(Path::new("/data/Anger/clip_001.wav")),
            Some(Emotion::Angry)
        );
        assert_eq!(
            label_from_path(Path::new("/data/misc/speaker_happiness_2.wav")),
            Some(Emotion::Happy)
        );
        assert_eq!(label_from_path(Path::new("/data/misc/clip.wav")), None);
    }

    #[test]
    fn test_collect_known_datasets() {
        let root = tempdir().unwrap();
        touch(&root.path().join("ravdess/Actor_01/03-01-04-01-01-01-01.wav"));
        touch(&root.path().join("ravdess/Actor_01/03-01-02-01-01-01-01.wav"));
        touch(&root.path().join("savee/DC/DC_h01.wav"));
        touch(&root.path().join("savee/DC/notes.txt"));

        let samples = collect_samples(root.path()).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].emotion, Emotion::Sad);
        assert_eq!(samples[0].dataset, Some(DatasetKind::Ravdess));
        assert_eq!(samples[1].emotion, Emotion::Happy);

        let infos = list_datasets(root.path()).unwrap();
        let ravdess = infos.iter().find(|i| i.id == "ravdess").unwrap();
        assert_eq!(ravdess.sample_count, 2);
        assert_eq!(ravdess.labeled_count, 1);
        assert_eq!(infos.iter().find(|i| i.id == "tess").unwrap().sample_count, 0);
    }

    #[test]
    fn test_collect_generic_tree() {
        let root = tempdir().unwrap();
        touch(&root.path().join("sadness/a.wav"));
        touch(&root.path().join("other/b.WAV"));

        let samples = collect_samples(root.path()).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].emotion, Emotion::Sad);
        assert_eq!(samples[0].dataset, None);
    }

    #[test]
    fn test_samples_filtered_by_emotion() {
        let root = tempdir().unwrap();
        touch(&root.path().join("emovo/m1-gio-1.wav"));
        touch(&root.path().join("emovo/m1-gio-2.wav"));
        touch(&root.path().join("emovo/f1-tri-1.wav"));
        touch(&root.path().join("tess/OAF_back_happy.wav"));

        let mut rng = StdRng::seed_from_u64(1);
        let happy = samples_for(root.path(), DatasetKind::Emovo, Some(Emotion::Happy), 10, &mut rng)
            .unwrap();
        assert_eq!(happy.len(), 2);
        assert!(happy.iter().all(|s| s.emotion == Emotion::Happy));
        assert!(happy.iter().all(|s| s.dataset == Some(DatasetKind::Emovo)));

        let all = samples_for(root.path(), DatasetKind::Emovo, None, 10, &mut rng).unwrap();
        assert_eq!(all.len(), 3);

        let none = samples_for(root.path(), DatasetKind::Savee, None, 10, &mut rng).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_samples_limit_draws_sorted_subset() {
        let root = tempdir().unwrap();
        for i in 0..12 {
            touch(&root.path().join(format!("tess/OAF_word{:02}_sad.wav", i)));
        }

        let mut rng = StdRng::seed_from_u64(7);
        let picked = samples_for(root.path(), DatasetKind::Tess, Some(Emotion::Sad), 5, &mut rng)
            .unwrap();
        assert_eq!(picked.len(), 5);
        assert!(picked.windows(2).all(|w| w[0].path < w[1].path));

        let mut again = StdRng::seed_from_u64(7);
        let repeat = samples_for(root.path(), DatasetKind::Tess, Some(Emotion::Sad), 5, &mut again)
            .unwrap();
        assert_eq!(picked, repeat);
    }

    #[test]
    fn test_count_by_emotion_across_corpora() {
        let root = tempdir().unwrap();
        touch(&root.path().join("ravdess/03-01-03-01-01-01-01.wav"));
        touch(&root.path().join("tess/OAF_back_happy.wav"));
        touch(&root.path().join("savee/DC_n01.wav"));
        touch(&root.path().join("emovo/m1-xyz-1.wav"));

        let counts = count_by_emotion(root.path()).unwrap();
        assert_eq!(counts.get(&Emotion::Happy), Some(&2));
        assert_eq!(counts.get(&Emotion::Neutral), Some(&1));
        assert_eq!(counts.get(&Emotion::Sad), None);
    }

    #[test]
    fn test_dataset_kind_from_str() {
        assert_eq!("SAVEE".parse::<DatasetKind>(), Ok(DatasetKind::Savee));
        assert!("crema".parse::<DatasetKind>().is_err());
    }

    #[test]
    fn test_missing_root() {
        let root = tempdir().unwrap();
        assert!(matches!(
            collect_samples(&root.path().join("nope")),
            Err(DatasetError::NotFound(_))
        ));
    }
}
