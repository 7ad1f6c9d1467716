//! A runtime that pretends every command is `echo`.

use std::{
   io::{
      self,
      Write as _,
   },
   sync::{
      Mutex,
      PoisonError,
   },
};

use arcstr::ArcStr;
use async_trait::async_trait;
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use sha2::{
   Digest as _,
   Sha256,
};

use super::Runtime;
use crate::{
   Context,
   Error,
   Result,
   Thunk,
   command::Command,
   protocol,
   thunk::ImageRef,
   value::ThunkPath,
};

#[derive(Default)]
pub struct FakeRuntime {
   runs:      Mutex<Vec<String>>,
   responses: DashMap<String, Vec<u8>, FxBuildHasher>,
}

impl FakeRuntime {
   /// The hashes of every thunk that actually ran.
   pub fn runs(&self) -> Vec<String> {
      self.runs.lock().unwrap_or_else(PoisonError::into_inner).clone()
   }
}

#[async_trait]
impl Runtime for FakeRuntime {
   async fn run(&self, ctx: &Context, out: &mut (dyn io::Write + Send), thunk: &Thunk) -> Result<()> {
      let hash = thunk.hash()?;

      if let Some(response) = self.responses.get(&hash) {
         out.write_all(&response)?;
         return Ok(());
      }

      let command = Command::resolve(thunk)?;
      let echoed = command.args.get(1..).unwrap_or_default().join(" ");

      let mut response = Vec::new();
      let mut writer = protocol::writer(&thunk.response().protocol, &mut response, ctx.stderr.clone())?;
      writeln!(writer, "{echoed}")?;
      writer.finish()?;
      drop(writer);

      self
         .runs
         .lock()
         .unwrap_or_else(PoisonError::into_inner)
         .push(hash.clone());

      out.write_all(&response)?;
      self.responses.insert(hash, response);
      Ok(())
   }

   async fn export_path(&self, _: &Context, _: &mut (dyn io::Write + Send), path: &ThunkPath) -> Result<()> {
      Err(Error::message(format!("cannot export {path} from a fake runtime")))
   }

   async fn resolve(&self, _: &Context, image: &ImageRef) -> Result<ImageRef> {
      let tag = image.tag.as_deref().unwrap_or("latest");
      let digest = Sha256::digest(format!("{repository}:{tag}", repository = image.repository));

      Ok(ImageRef {
         digest: Some(ArcStr::from(format!("sha256:{hex}", hex = hex::encode(digest)))),
         ..image.clone()
      })
   }

   async fn prune(&self, _: &Context) -> Result<()> {
      self.responses.clear();
      Ok(())
   }
}

#[cfg(test)]
mod tests {
   use std::sync::Arc;

   use super::{
      super::Pool,
      *,
   };
   use crate::{
      Value,
      thunk::{
         Platform,
         ThunkCmd,
         ThunkImage,
      },
      value::CommandPath,
   };

   fn image() -> ThunkImage {
      ThunkImage::Ref(ImageRef {
         platform:   Platform::new("linux", ""),
         repository: "alpine".into(),
         tag:        None,
         digest:     None,
      })
   }

   #[tokio::test]
   async fn responses_are_cached_by_hash() {
      let fake = Arc::new(FakeRuntime::default());
      let pool = Pool::default().with_runtime(Platform::new("linux", ""), fake.clone());
      let ctx = Context::builder().pool(Arc::new(pool)).build();

      let echo = Thunk::new(ThunkCmd::Command(CommandPath { name: "echo".into() }))
         .with_args(vec![Value::string("\"hi\"")])
         .with_image(image());

      let values = ctx.pool.read(&ctx, &echo).await.unwrap().collect().await.unwrap();
      assert_eq!(values, [Value::string("hi")]);

      let again = ctx.pool.read(&ctx, &echo).await.unwrap().collect().await.unwrap();
      assert_eq!(again, values);

      assert_eq!(fake.runs(), [echo.hash().unwrap()]);
      assert_eq!(echo.hash().unwrap(), echo.clone().hash().unwrap());
   }

   #[tokio::test]
   async fn resolving_pins_a_digest() {
      let ThunkImage::Ref(image) = image() else {
         unreachable!();
      };

      let resolved = FakeRuntime::default()
         .resolve(&Context::default(), &image)
         .await
         .unwrap();

      assert!(resolved.digest.as_deref().is_some_and(|digest| digest.starts_with("sha256:")));
      assert_eq!(resolved.repository, image.repository);
   }
}
