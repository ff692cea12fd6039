use dashmap::DashMap;
use std::time::SystemTime;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShopRecord {
	pub shop: String,
	pub access_token: String,
	pub installed_at: SystemTime,
}

/// Shops that finished the install flow, keyed by shop domain.  Memory only.
#[derive(Default)]
pub struct ShopStore {
	shops: DashMap<String, ShopRecord>,
}

impl ShopStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Replaces any earlier record of the same shop, a reinstall hands out a new token.
	pub fn store_shop(&self, shop: impl Into<String>, access_token: impl Into<String>) {
		let shop = shop.into();
		self.shops.insert(
			shop.clone(),
			ShopRecord {
				shop,
				access_token: access_token.into(),
				installed_at: SystemTime::now(),
			},
		);
	}

	pub fn get_shop(&self, shop: &str) -> Option<ShopRecord> {
		self.shops.get(shop).map(|record| record.value().clone())
	}
}
