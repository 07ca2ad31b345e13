mod checksums;
pub mod codes;
mod error;
mod manifest;
pub mod messages;
mod offer;
pub mod version;

pub use checksums::{is_content_path, is_relative_path, is_root_document, ChecksumSet};
pub use error::{ErrorData, ErrorEntry, ErrorKind, RollbackData, UpgradeError, UpgradeResult};
pub use manifest::{BundledItem, BundledKind, UpgradeManifests, VendoredFile, VersionManifest};
pub use offer::{CoreUpdateOffer, OfferedPackages, Package, PackageVariant};

#[cfg(test)]
mod tests;
