//! Common imports from external crates.

pub use anyhow::{bail, ensure, format_err, Context, Error, Result};
pub use bbox::{prelude::*, BoxMode, Transform, XYXY};
pub use chrono::Local;
pub use image::{imageops::FilterType, GenericImageView, Rgb, RgbImage};
pub use indexmap::{IndexMap, IndexSet};
pub use itertools::{izip, Itertools};
pub use noisy_float::prelude::*;
pub use rand::{prelude::*, rngs::StdRng, seq::SliceRandom};
pub use serde::{Deserialize, Serialize};
pub use std::{
    collections::{HashMap, VecDeque},
    convert::TryFrom,
    fmt::{self, Debug},
    fs::{self, File},
    io::{BufRead, BufReader, BufWriter, Write},
    num::NonZeroUsize,
    ops::Range,
    path::{Path, PathBuf},
    sync::{Arc, Barrier},
    time::{Duration, Instant},
};
pub use tracing::{debug, info, info_span, warn};

pub type Fallible<T> = Result<T, Error>;
