pub mod elf;
pub mod loader;

pub use elf::{ElfError, Elf32Ehdr, Elf32Phdr, EM_PPC, ET_EXEC, PF_R, PF_W, PF_X, PT_LOAD};
pub use loader::{load_image, ImageInfo, LoadError};
