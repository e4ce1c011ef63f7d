use proc_macro::TokenStream;
use quote::quote;
use syn::{Error, ItemFn, Meta};

pub(super) fn implement(item: ItemFn, args: &[Meta]) -> super::Result<TokenStream> {
	let Some(Meta::Path(receiver)) = args.first() else {
		return Err(Error::new_spanned(
			&item.sig,
			"expected the receiver type as the attribute argument",
		));
	};

	if args.len() > 1 {
		return Err(Error::new_spanned(&item.sig, "unexpected additional arguments"));
	}

	let out = quote! {
		impl #receiver {
			#item
		}
	};

	Ok(out.into())
}
